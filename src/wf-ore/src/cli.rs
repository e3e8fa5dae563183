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

//! Command-line parsing glue shared by the workspace's binaries.

use clap::Parser;

/// Options that tweak how [`parse_args`] behaves.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// If set, `clap` will also read `env_prefix`-prefixed environment
    /// variables for any `#[clap(env)]` argument that doesn't name its own
    /// variable explicitly.
    pub env_prefix: Option<&'static str>,
}

/// Parses command-line arguments for `O`, applying workspace-wide
/// conventions (currently: an optional environment variable prefix).
pub fn parse_args<O>(config: CliConfig) -> O
where
    O: Parser,
{
    let mut command = O::command();
    if let Some(prefix) = config.env_prefix {
        command = command.mut_args(|arg| {
            if arg.get_env().is_none() {
                arg
            } else {
                let env_name = format!("{prefix}{}", arg.get_id().to_string().to_uppercase());
                arg.env(env_name)
            }
        });
    }
    let matches = command.get_matches();
    O::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}
