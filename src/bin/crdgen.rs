//! Prints the NetworkPolicyGitOps CRD as YAML.
//!
//! `cargo run --bin crdgen | kubectl apply -f -`

use kube::CustomResourceExt;
use netpol_gitops_controller::crd::NetworkPolicyGitOps;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&NetworkPolicyGitOps::crd())?);
    Ok(())
}
