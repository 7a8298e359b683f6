//! # NetworkPolicy GitOps Controller
//!
//! Watches `NetworkPolicyGitOps` resources and keeps their namespaces'
//! NetworkPolicies flowing into the GitOps repository through pull requests.
//!
//! See the [README.md](../README.md) for usage.

use anyhow::Result;
use netpol_gitops_controller::runtime::initialization::initialize;
use netpol_gitops_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.configs, init.reconciler, init.server_state).await
}
