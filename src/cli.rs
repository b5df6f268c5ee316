use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

/// Golden-master testing for HTTP APIs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log debug output, including chaining resolution, to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a request script and compare the responses against its facit
    Test {
        /// Request script to run
        script: PathBuf,

        /// Facit file to compare against, defaults to `<script>.facit`
        #[arg(short, long)]
        facit: Option<PathBuf>,

        /// Config file, defaults to `facit.toml` next to the script
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exit with an error when any response differs from the facit
        #[arg(long)]
        strict: bool,
    },
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use clap::Parser;

    use crate::cli::Cli;
    use crate::cli::Command;

    #[test]
    fn parses_test_command() {
        let cli = Cli::parse_from(["facit", "test", "api.http", "--strict", "-v"]);

        assert!(cli.verbose);
        let Command::Test {
            script,
            facit,
            config,
            strict,
        } = cli.command;
        assert_eq!(script, PathBuf::from("api.http"));
        assert_eq!(facit, None);
        assert_eq!(config, None);
        assert!(strict);
    }

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
