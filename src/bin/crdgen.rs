//! Prints the Kubeturbo CRD manifest as YAML.

use kubeturbo_operator::crd::kubeturbo_crd;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&kubeturbo_crd())?);
    Ok(())
}
