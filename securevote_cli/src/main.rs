use clap::{App, AppSettings, Arg, SubCommand};
use num_enum::TryFromPrimitive;

mod command_admin;
mod command_chain;
mod command_election;
mod command_voter;
mod rest;

use rest::{Api, RestError};

#[derive(TryFromPrimitive, PartialEq, PartialOrd, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
}

fn main() {
    let matches = App::new("SecureVote CLI")
        .version("0.1.0")
        .about("Interacts with a SecureVote daemon")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("uri")
                .help("Set the securevote uri - can also be set with SECUREVOTE_URI")
                .required(false),
        )
        .arg(
            Arg::with_name("token")
                .long("token")
                .takes_value(true)
                .help("Bearer token from a voter or admin login - can also be set with SECUREVOTE_TOKEN"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .help("Only print errors"),
        )
        .subcommand(SubCommand::with_name("health").about("Check that the daemon is up"))
        .subcommand(
            SubCommand::with_name("otp")
                .about("One-time passwords")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("send")
                        .about("Email a one-time password")
                        .arg(Arg::with_name("EMAIL").index(1).required(true))
                        .arg(
                            Arg::with_name("purpose")
                                .long("purpose")
                                .takes_value(true)
                                .possible_values(&["login", "registration"])
                                .default_value("login"),
                        ),
                )
                .subcommand(
                    SubCommand::with_name("verify")
                        .about("Verify a one-time password, printing a voter token on login")
                        .arg(Arg::with_name("EMAIL").index(1).required(true))
                        .arg(Arg::with_name("OTP").index(2).required(true))
                        .arg(
                            Arg::with_name("purpose")
                                .long("purpose")
                                .takes_value(true)
                                .possible_values(&["login", "registration"])
                                .default_value("login"),
                        ),
                )
                .subcommand(
                    SubCommand::with_name("status")
                        .about("Show whether a code is outstanding for an address")
                        .arg(Arg::with_name("EMAIL").index(1).required(true)),
                ),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("Show the registration status of an address")
                .arg(Arg::with_name("EMAIL").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("register")
                .about("Submit a voter registration")
                .arg(
                    Arg::with_name("FILE")
                        .index(1)
                        .required(true)
                        .help("Registration details in JSON format"),
                )
                .arg(
                    Arg::with_name("otp")
                        .long("otp")
                        .takes_value(true)
                        .required(true)
                        .help("Registration code emailed by `otp send --purpose registration`"),
                ),
        )
        .subcommand(SubCommand::with_name("elections").about("List open and closed elections"))
        .subcommand(
            SubCommand::with_name("election")
                .about("Show an election and its candidates")
                .arg(Arg::with_name("ELECTION-ID").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("results")
                .about("Show the current tally of an election")
                .arg(Arg::with_name("ELECTION-ID").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Cast a vote (needs a voter token)")
                .arg(Arg::with_name("ELECTION-ID").index(1).required(true))
                .arg(Arg::with_name("CANDIDATE-ID").index(2).required(true)),
        )
        .subcommand(
            SubCommand::with_name("receipt")
                .about("Look up a vote receipt")
                .arg(Arg::with_name("RECEIPT").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("chain")
                .about("Inspect the vote ledger")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("stats").about("Chain statistics"))
                .subcommand(
                    SubCommand::with_name("blocks")
                        .about("Most recent blocks")
                        .arg(
                            Arg::with_name("count")
                                .long("count")
                                .takes_value(true)
                                .default_value("10"),
                        ),
                )
                .subcommand(
                    SubCommand::with_name("block")
                        .about("Show one block in full")
                        .arg(Arg::with_name("INDEX").index(1).required(true)),
                )
                .subcommand(SubCommand::with_name("verify").about("Validate the whole chain")),
        )
        .subcommand(command_admin::subcommand())
        .get_matches();

    let verbosity = if matches.is_present("quiet") {
        Verbosity::Quiet
    } else {
        let level = matches.occurrences_of("v").min(1) as u8 + 1;
        Verbosity::try_from(level).unwrap_or(Verbosity::Normal)
    };

    let env_uri = std::env::var("SECUREVOTE_URI");
    let uri = match matches.value_of("uri") {
        Some(uri) => uri,
        None => env_uri.as_deref().unwrap_or("http://localhost:3003"),
    };
    let token = matches
        .value_of("token")
        .map(str::to_owned)
        .or_else(|| std::env::var("SECUREVOTE_TOKEN").ok());
    if verbosity >= Verbosity::Verbose {
        eprintln!("URI: {}", uri);
    }

    let api = Api::new(uri, token);

    let result = match matches.subcommand() {
        ("health", Some(_)) => command_chain::command_health(&api, verbosity),
        ("otp", Some(m)) => command_voter::command_otp(m, &api, verbosity),
        ("check", Some(m)) => command_voter::command_check(m, &api, verbosity),
        ("register", Some(m)) => command_voter::command_register(m, &api, verbosity),
        ("elections", Some(_)) => command_election::command_elections(&api, verbosity),
        ("election", Some(m)) => command_election::command_election(m, &api, verbosity),
        ("results", Some(m)) => command_election::command_results(m, &api, verbosity),
        ("vote", Some(m)) => command_election::command_vote(m, &api, verbosity),
        ("receipt", Some(m)) => command_election::command_receipt(m, &api, verbosity),
        ("chain", Some(m)) => command_chain::command_chain(m, &api, verbosity),
        ("admin", Some(m)) => command_admin::command_admin(m, &api, verbosity),
        _ => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("securevote: {}", e);
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Rest(#[from] RestError),

    #[error("unable to read {0}: {1}")]
    Read(String, std::io::Error),

    #[error("{0} is not a JSON text file")]
    NotText(String),

    #[error("invalid JSON in {0}: {1}")]
    Json(String, serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T = (), E = CliError> = std::result::Result<T, E>;

/// Expand `~` and environment variables in a user supplied argument
pub fn expand(arg: &str) -> String {
    shellexpand::full(arg)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| arg.to_owned())
}

/// Read and parse a JSON file named on the command line
pub fn read_json_file(filename: &str) -> Result<serde_json::Value> {
    use content_inspector::ContentType;

    let filename = expand(filename);
    let bytes = std::fs::read(&filename).map_err(|e| CliError::Read(filename.clone(), e))?;
    match content_inspector::inspect(&bytes) {
        ContentType::UTF_8 | ContentType::UTF_8_BOM => {}
        _ => return Err(CliError::NotText(filename)),
    }
    let text = String::from_utf8_lossy(&bytes);
    serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(|e| CliError::Json(filename, e))
}

/// Print a response as pretty JSON unless running quietly
pub fn print_json(value: &impl serde::Serialize, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("securevote: unable to print response: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_environment() {
        std::env::set_var("SECUREVOTE_CLI_TEST_DIR", "/tmp/securevote");
        assert_eq!(
            expand("$SECUREVOTE_CLI_TEST_DIR/voter.json"),
            "/tmp/securevote/voter.json"
        );
        assert_eq!(expand("plain.json"), "plain.json");
    }

    #[test]
    fn reads_json_files() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("securevote-cli-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"full_name": "Asha Verma"}"#).unwrap();
        let value = read_json_file(path.to_str().unwrap()).unwrap();
        assert_eq!(value["full_name"], "Asha Verma");

        std::fs::write(&path, [0u8, 159, 146, 150, 0, 1]).unwrap();
        assert!(matches!(
            read_json_file(path.to_str().unwrap()),
            Err(CliError::NotText(_))
        ));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            read_json_file("/nonexistent/securevote.json"),
            Err(CliError::Read(..))
        ));
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(Verbosity::try_from(2u8).unwrap(), Verbosity::Verbose);
        assert!(Verbosity::try_from(7u8).is_err());
        assert!(Verbosity::Quiet < Verbosity::Normal);
    }
}
