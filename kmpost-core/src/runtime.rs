/// Command-line switches. Anything else on the command line is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
  pub version: bool,
  pub help: bool,
  pub dry_run: bool,
  pub check_config: bool,
}

pub fn parse_flags(args: &[String]) -> anyhow::Result<Flags> {
  let mut flags = Flags::default();
  // args[0] is the program path.
  for arg in args.iter().skip(1) {
    match arg.as_str() {
      "--version" | "-V" => flags.version = true,
      "--help" | "-h" => flags.help = true,
      "--dry-run" => flags.dry_run = true,
      "--check-config" => flags.check_config = true,
      other => anyhow::bail!("unknown argument: {other} (see --help)"),
    }
  }
  Ok(flags)
}
