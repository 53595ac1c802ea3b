//! Print the CustomResourceDefinitions as a JSON list
//!
//! `cargo run --bin gen-crd | kubectl apply -f -`

use kube::CustomResourceExt;
use rollout_orchestrator::crd::{RolloutOrchestrator, StagePodAutoscaler};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let list = json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [RolloutOrchestrator::crd(), StagePodAutoscaler::crd()],
    });

    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}
