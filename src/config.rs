use clap::Parser;

#[derive(Debug, Parser)]
pub struct Config {
    #[arg(long, default_value_t = false, env = "NO_ANSI")]
    pub no_ansi: bool,
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: usize,
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
    /// Secret used to sign access tokens
    #[arg(long, env = "TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: String,
    #[arg(long, env = "TOKEN_EXPIRE_MINUTES", default_value_t = 30)]
    pub token_expire_minutes: i64,

    /// Causes the application to invoke a full reset on the database, revert everything
    /// then reapply the migrations, this *CAN* cause data loss
    #[arg(long, default_value_t = false)]
    pub reset_database: bool,

    /// Cause the server to revert the database by the specified number of revisions before
    /// starting, can be useful for recovery
    #[arg(long, conflicts_with = "reset_database")]
    pub revert_database: Option<usize>,

    /// Apply revisions up to and including the given revision instead of the head
    #[arg(long, conflicts_with_all = ["reset_database", "revert_database", "downgrade_to"])]
    pub upgrade_to: Option<String>,

    /// Revert revisions until the given revision is the current one, `base` reverts all of them
    #[arg(long, conflicts_with_all = ["reset_database", "revert_database"])]
    pub downgrade_to: Option<String>,

    /// Exit once the database migration has finished instead of serving traffic
    #[arg(long, default_value_t = false)]
    pub migrate_only: bool,
}

impl Config {
    /// The revision `--downgrade-to` names, `Some(None)` when everything should be reverted
    pub fn downgrade_target(&self) -> Option<Option<&str>> {
        self.downgrade_to
            .as_deref()
            .map(|target| (target != "base").then_some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(
            ["quorum", "--database-url", "postgres://localhost/quorum", "--token-secret", "s"]
                .iter()
                .chain(args),
        )
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(8000, config.port);
        assert_eq!(30, config.token_expire_minutes);
        assert!(!config.reset_database);
        assert!(!config.migrate_only);
        assert_eq!(None, config.downgrade_target());
    }

    #[test]
    fn downgrade_targets() {
        assert_eq!(
            Some(None),
            parse(&["--downgrade-to", "base"]).unwrap().downgrade_target()
        );
        assert_eq!(
            Some(Some("976d3b9337bd")),
            parse(&["--downgrade-to", "976d3b9337bd"])
                .unwrap()
                .downgrade_target()
        );
    }

    #[test]
    fn migration_controls_conflict() {
        assert!(parse(&["--reset-database", "--revert-database", "1"]).is_err());
        assert!(parse(&["--upgrade-to", "a", "--downgrade-to", "b"]).is_err());
    }
}
