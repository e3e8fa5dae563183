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

//! Error-formatting helpers.

use std::fmt::Write;

/// Extension trait for rendering an error together with its full `.source()`
/// chain, the way a CLI wants to print a fatal error.
pub trait ErrorExt {
    /// Renders `self`, followed by `: caused by: <source>` for each source
    /// in the error's cause chain.
    fn display_with_causes(&self) -> String;
}

impl ErrorExt for anyhow::Error {
    fn display_with_causes(&self) -> String {
        let mut out = self.to_string();
        for cause in self.chain().skip(1) {
            write!(out, ": caused by: {}", cause).expect("writing to a String cannot fail");
        }
        out
    }
}
