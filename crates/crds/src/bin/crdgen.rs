//! Prints the WebService CRD manifest as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/webservice.yaml`

use crds::WebService;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&WebService::crd())?);
    Ok(())
}
