use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  kmpost_core::run(&args).context("run kmpost")
}
