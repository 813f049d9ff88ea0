use clap::{ArgGroup, Parser, Subcommand};

/// Drive the alarm delivery pipeline against an in-process host.
#[derive(Parser, Debug)]
#[command(name = "wakebell", about = "Exact-time alarm delivery pipeline")]
pub struct CliArgs {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "WAKEBELL_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the alert now, bypassing the wake timer
    Launch {
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        body: Option<String>,

        /// Seconds to let the alert ring before dismissing it
        #[arg(long, default_value = "5")]
        ring_for: u64,
    },

    /// Register an exact wake and follow the delivery until it ends
    #[command(group(ArgGroup::new("when").required(true).args(["at", "in_secs"])))]
    Schedule {
        /// Fire instant in epoch milliseconds
        #[arg(long)]
        at: Option<i64>,

        /// Fire this many seconds from now
        #[arg(long = "in")]
        in_secs: Option<u64>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        body: Option<String>,

        /// Simulate a host where the exact-alarm capability was not granted
        #[arg(long)]
        deny_exact: bool,
    },

    /// Read one JSON command per stdin line and answer on stdout
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_requires_a_time() {
        assert!(CliArgs::try_parse_from(["wakebell", "schedule", "--title", "x"]).is_err());
        assert!(CliArgs::try_parse_from(["wakebell", "schedule", "--at", "1", "--in", "2"]).is_err());

        let args = CliArgs::try_parse_from(["wakebell", "schedule", "--in", "3"]).unwrap();
        assert!(matches!(args.command, Command::Schedule { in_secs: Some(3), at: None, .. }));
    }

    #[test]
    fn launch_defaults() {
        let args = CliArgs::try_parse_from(["wakebell", "launch"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Launch { title: None, body: None, ring_for: 5 }
        ));
    }
}
