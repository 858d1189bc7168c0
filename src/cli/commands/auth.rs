use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL; drives the CORS origin and the Secure cookie flag")
                .env("CONECTA_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds")
                .env("CONECTA_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
}

impl Options {
    /// Collect auth-related arguments from validated CLI matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>("frontend-base-url")
            .cloned()
            .context("missing required argument: --frontend-base-url")?;
        let session_ttl_seconds = matches
            .get_one::<i64>("session-ttl-seconds")
            .copied()
            .context("missing required argument: --session-ttl-seconds")?;
        Ok(Self {
            frontend_base_url,
            session_ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    #[test]
    fn defaults_apply() -> Result<()> {
        let command = with_args(Command::new("test"));
        let matches = command.get_matches_from(vec!["test"]);
        let options = Options::parse(&matches)?;
        assert_eq!(options.frontend_base_url, "http://localhost:3000");
        assert_eq!(options.session_ttl_seconds, 86_400);
        Ok(())
    }

    #[test]
    fn overrides_apply() -> Result<()> {
        let command = with_args(Command::new("test"));
        let matches = command.get_matches_from(vec![
            "test",
            "--frontend-base-url",
            "https://conecta.dev",
            "--session-ttl-seconds",
            "3600",
        ]);
        let options = Options::parse(&matches)?;
        assert_eq!(options.frontend_base_url, "https://conecta.dev");
        assert_eq!(options.session_ttl_seconds, 3600);
        Ok(())
    }
}
