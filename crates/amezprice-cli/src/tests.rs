use super::*;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["amezprice-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["amezprice-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["amezprice-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_admin_create_with_all_flags() {
    let cli = Cli::try_parse_from([
        "amezprice-cli",
        "admin",
        "create",
        "--username",
        "root",
        "--email",
        "root@example.com",
        "--password",
        "s3cret-pass",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Admin {
            command: AdminCommands::Create {
                ref username,
                ref email,
                ref password,
                ref first_name,
            }
        }) if username == "root"
            && email == "root@example.com"
            && password == "s3cret-pass"
            && first_name == "Admin"
    ));
}

#[test]
fn admin_create_requires_username() {
    let result = Cli::try_parse_from([
        "amezprice-cli",
        "admin",
        "create",
        "--email",
        "root@example.com",
        "--password",
        "s3cret-pass",
    ]);
    assert!(result.is_err());
}

#[test]
fn search_takes_positional_url() {
    let cli = Cli::try_parse_from(["amezprice-cli", "search", "https://amzn.in/d/abc123"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Search { ref url, dry_run: false }) if url == "https://amzn.in/d/abc123"
    ));
}

#[test]
fn search_dry_run() {
    let cli = Cli::try_parse_from([
        "amezprice-cli",
        "search",
        "--dry-run",
        "https://www.flipkart.com/p/itm?pid=MOBGTAGPTB3VS24W",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Search { dry_run: true, .. })
    ));
}

#[test]
fn search_requires_url() {
    assert!(Cli::try_parse_from(["amezprice-cli", "search"]).is_err());
}

#[test]
fn parses_prices_refresh() {
    let cli = Cli::try_parse_from(["amezprice-cli", "prices", "refresh"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Prices {
            command: PricesCommands::Refresh { dry_run: false }
        })
    ));

    let cli = Cli::try_parse_from(["amezprice-cli", "prices", "refresh", "--dry-run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Prices {
            command: PricesCommands::Refresh { dry_run: true }
        })
    ));
}

#[test]
fn parses_sessions_purge() {
    let cli = Cli::try_parse_from(["amezprice-cli", "sessions", "purge"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sessions {
            command: SessionsCommands::Purge
        })
    ));
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["amezprice-cli", "collect", "products"]).is_err());
}
