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

//! Command-line surface: a `serve` daemon subcommand and a `svc` group of
//! one-shot catalog read/write commands, grounded on the original's
//! `fluxctl` query tool and `stash-debug`'s clap layout.

use std::net::{IpAddr, SocketAddr};

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "wf-balancerd", version, about = "Service-discovery-backed instance pool daemon")]
pub struct Args {
    /// Use the embedded in-process backend instead of connecting to etcd.
    #[arg(long, global = true, env = "WF_LOCAL_BACKEND")]
    pub local: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the reconciliation daemon: watches the catalog, maintains one
    /// instance pool per service, and serves `/metrics` and `/healthz`.
    Serve(ServeArgs),
    /// One-shot catalog reads and writes.
    Svc {
        #[command(subcommand)]
        action: SvcAction,
    },
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Address the HTTP server (metrics, health) listens on.
    #[arg(long, env = "WF_HTTP_LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub http_listen_addr: SocketAddr,

    /// Base retry interval, in milliseconds, for the instance pool's
    /// exponential backoff.
    #[arg(long, env = "WF_RETRY_BASE_MILLIS", default_value_t = 250)]
    pub retry_base_millis: u64,

    /// The exponent cap on the backoff multiplier (so the maximum backoff
    /// is `retry_base_millis * 2^retry_cap_exponent`).
    #[arg(long, env = "WF_RETRY_CAP_EXPONENT", default_value_t = 5)]
    pub retry_cap_exponent: u32,

    /// How often the retry-tick driver calls `ProcessRetries` on every
    /// pool.
    #[arg(long, env = "WF_RETRY_TICK_MILLIS", default_value_t = 250)]
    pub retry_tick_millis: u64,
}

#[derive(Debug, Subcommand)]
pub enum SvcAction {
    /// Lists instances selected by the given filter.
    Query {
        /// Print only instances in this service.
        #[arg(short, long)]
        service: Option<String>,
        /// Select only instances on the given host.
        #[arg(long)]
        host: Option<String>,
        /// Select only instances in the given state (e.g. "live").
        #[arg(long)]
        state: Option<String>,
        /// Select only instances matched by the rule named.
        #[arg(long)]
        rule: Option<String>,
        /// Print only instance names, one per line.
        #[arg(short, long)]
        quiet: bool,
        /// Print matched instances as JSON, one object per line.
        #[arg(long)]
        json: bool,
    },
    /// Registers a service.
    AddService {
        service: String,
        #[arg(long)]
        instance_port: u16,
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
    /// Removes a service and everything under it.
    RmService { service: String },
    /// Registers a backend instance of a service.
    AddInstance {
        service: String,
        instance: String,
        #[arg(long)]
        host_ip: IpAddr,
        #[arg(long)]
        address: SocketAddr,
    },
}
