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

//! The daemon and CLI binary: `serve` runs the reconciliation loop and
//! HTTP surface; `svc` is a one-shot catalog read/write tool.

mod backend;
mod cli;
mod http;
mod serve;
mod svc;

use std::sync::Arc;

use wf_catalog::{Catalog, CatalogError};
use wf_ore::cli::CliConfig;
use wf_ore::error::ErrorExt;

#[tokio::main]
async fn main() {
    wf_ore::logging::init("WF_BALANCERD_LOG");
    let args: cli::Args = wf_ore::cli::parse_args(CliConfig { env_prefix: None });
    if let Err(err) = run(args).await {
        eprintln!("wf-balancerd: fatal: {}", err.display_with_causes());
        std::process::exit(1);
    }
}

async fn run(args: cli::Args) -> Result<(), anyhow::Error> {
    match args.command {
        cli::Command::Serve(serve_args) => serve::run(serve_args, args.local).await,
        cli::Command::Svc { action } => {
            let backend = backend::bootstrap(args.local).await?;
            let catalog = Catalog::new(Arc::clone(&backend));
            svc::run(&catalog, action).await.map_err(|err| match err {
                CatalogError::NotFound => anyhow::anyhow!("not found"),
                other => anyhow::Error::new(other),
            })
        }
    }
}
