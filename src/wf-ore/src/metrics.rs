// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A thin wrapper around a [`prometheus::Registry`].

use prometheus::{Encoder, Registry, TextEncoder};

/// The process-wide collection of Prometheus metrics.
#[derive(Clone, Debug, Default)]
pub struct MetricsRegistry(Registry);

impl MetricsRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> MetricsRegistry {
        MetricsRegistry(Registry::new())
    }

    /// Registers a collector, panicking on a duplicate metric name — a
    /// programmer error, not a runtime condition.
    pub fn register(&self, collector: Box<dyn prometheus::core::Collector>) {
        self.0
            .register(collector)
            .expect("metric name collision in MetricsRegistry::register");
    }

    /// Encodes all registered metrics in the Prometheus text exposition
    /// format.
    pub fn gather_and_encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.0.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
