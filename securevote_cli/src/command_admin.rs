use crate::rest::Api;
use crate::{print_json, read_json_file, CliError, Result, Verbosity};
use clap::{App, AppSettings, Arg, SubCommand};
use securevote::{Candidate, Election, RegistrationSummary};
use serde_json::{json, Value};

pub fn subcommand() -> App<'static, 'static> {
    SubCommand::with_name("admin")
        .about("Election administration (needs an admin token except for login)")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("login")
                .about("Log in and print an admin token")
                .arg(Arg::with_name("OFFICIAL-ID").index(1).required(true))
                .arg(Arg::with_name("EMAIL").index(2).required(true))
                .arg(
                    Arg::with_name("password")
                        .long("password")
                        .takes_value(true)
                        .help("Password - can also be set with SECUREVOTE_ADMIN_PASSWORD"),
                ),
        )
        .subcommand(
            SubCommand::with_name("registrations")
                .about("List voter registrations")
                .arg(
                    Arg::with_name("status")
                        .long("status")
                        .takes_value(true)
                        .possible_values(&["pending", "approved", "rejected"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("approve")
                .about("Approve a voter registration")
                .arg(Arg::with_name("REGISTRATION-ID").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("reject")
                .about("Reject a voter registration")
                .arg(Arg::with_name("REGISTRATION-ID").index(1).required(true)),
        )
        .subcommand(SubCommand::with_name("elections").about("List all elections, drafts included"))
        .subcommand(
            SubCommand::with_name("create-election")
                .about("Create a draft election")
                .arg(
                    Arg::with_name("FILE")
                        .index(1)
                        .required(true)
                        .help("Election in JSON format: title, description, type, start_date, end_date"),
                ),
        )
        .subcommand(
            SubCommand::with_name("start")
                .about("Open an election for voting")
                .arg(Arg::with_name("ELECTION-ID").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("stop")
                .about("Close an election")
                .arg(Arg::with_name("ELECTION-ID").index(1).required(true)),
        )
        .subcommand(
            SubCommand::with_name("add-candidates")
                .about("Add candidates to an election, all or nothing")
                .arg(Arg::with_name("ELECTION-ID").index(1).required(true))
                .arg(
                    Arg::with_name("FILE")
                        .index(2)
                        .required(true)
                        .help("JSON array of candidates: name, party, age, qualification, manifesto"),
                ),
        )
        .subcommand(
            SubCommand::with_name("edit-candidate")
                .about("Correct a candidate of a draft election")
                .arg(Arg::with_name("CANDIDATE-ID").index(1).required(true))
                .arg(
                    Arg::with_name("FILE")
                        .index(2)
                        .required(true)
                        .help("Candidate in JSON format: name, party, age, qualification, manifesto"),
                ),
        )
        .subcommand(
            SubCommand::with_name("remove-candidate")
                .about("Withdraw a candidate from a draft election")
                .arg(Arg::with_name("CANDIDATE-ID").index(1).required(true)),
        )
        .subcommand(SubCommand::with_name("seal").about("Seal pending votes into a block now"))
        .subcommand(SubCommand::with_name("stats").about("Dashboard statistics"))
}

pub fn command_admin(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    if let ("login", Some(m)) = matches.subcommand() {
        return command_admin_login(m, api, verbosity);
    }

    if !api.has_token() {
        return Err(CliError::Usage(
            "admin commands need a token, run `admin login` first".to_owned(),
        ));
    }

    match matches.subcommand() {
        ("registrations", Some(m)) => {
            let path = match m.value_of("status") {
                Some(status) => format!("/api/admin/registrations?status={}", status),
                None => "/api/admin/registrations".to_owned(),
            };
            let records: Vec<RegistrationSummary> = api.get(&path)?;
            print_json(&records, verbosity);
        }
        ("approve", Some(m)) => {
            let id = m.value_of("REGISTRATION-ID").unwrap_or_default();
            let record: RegistrationSummary =
                api.post(&format!("/api/admin/approve/{}", id), &json!({}))?;
            print_json(&record, verbosity);
        }
        ("reject", Some(m)) => {
            let id = m.value_of("REGISTRATION-ID").unwrap_or_default();
            let record: RegistrationSummary =
                api.post(&format!("/api/admin/reject/{}", id), &json!({}))?;
            print_json(&record, verbosity);
        }
        ("elections", Some(_)) => {
            let elections: Vec<Election> = api.get("/api/admin/elections")?;
            print_json(&elections, verbosity);
        }
        ("create-election", Some(m)) => {
            let body = read_json_file(m.value_of("FILE").unwrap_or_default())?;
            let election: Election = api.post("/api/admin/elections", &body)?;
            print_json(&election, verbosity);
        }
        ("start", Some(m)) => {
            let id = m.value_of("ELECTION-ID").unwrap_or_default();
            let election: Election =
                api.post(&format!("/api/admin/elections/{}/start", id), &json!({}))?;
            print_json(&election, verbosity);
        }
        ("stop", Some(m)) => {
            let id = m.value_of("ELECTION-ID").unwrap_or_default();
            let election: Election =
                api.post(&format!("/api/admin/elections/{}/stop", id), &json!({}))?;
            print_json(&election, verbosity);
        }
        ("add-candidates", Some(m)) => {
            let candidates = read_json_file(m.value_of("FILE").unwrap_or_default())?;
            let body = bulk_candidates(m.value_of("ELECTION-ID").unwrap_or_default(), candidates)?;
            let added: Vec<Candidate> = api.post("/api/admin/candidates/bulk", &body)?;
            print_json(&added, verbosity);
        }
        ("edit-candidate", Some(m)) => {
            let id = m.value_of("CANDIDATE-ID").unwrap_or_default();
            let body = read_json_file(m.value_of("FILE").unwrap_or_default())?;
            let candidate: Candidate =
                api.put(&format!("/api/admin/candidates/{}", id), &body)?;
            print_json(&candidate, verbosity);
        }
        ("remove-candidate", Some(m)) => {
            let id = m.value_of("CANDIDATE-ID").unwrap_or_default();
            let res: Value = api.delete(&format!("/api/admin/candidates/{}", id))?;
            print_json(&res, verbosity);
        }
        ("seal", Some(_)) => {
            let res: Value = api.post("/api/admin/seal", &json!({}))?;
            print_json(&res, verbosity);
        }
        ("stats", Some(_)) => {
            let res: Value = api.get("/api/admin/stats")?;
            print_json(&res, verbosity);
        }
        _ => {}
    }
    Ok(())
}

fn command_admin_login(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    let password = match matches.value_of("password") {
        Some(password) => password.to_owned(),
        None => std::env::var("SECUREVOTE_ADMIN_PASSWORD").map_err(|_| {
            CliError::Usage(
                "provide a password with --password or SECUREVOTE_ADMIN_PASSWORD".to_owned(),
            )
        })?,
    };
    let body = json!({
        "official_id": matches.value_of("OFFICIAL-ID").unwrap_or_default(),
        "email": matches.value_of("EMAIL").unwrap_or_default(),
        "password": password,
    });
    let res: Value = api.post("/api/admin/login", &body)?;
    print_json(&res, verbosity);
    if let Some(token) = res["token"].as_str() {
        if verbosity >= Verbosity::Normal {
            eprintln!("export SECUREVOTE_TOKEN={}", token);
        }
    }
    Ok(())
}

/// Accept either a bare array of candidates or an object with a `candidates` array
fn bulk_candidates(election_id: &str, file: Value) -> Result<Value> {
    let candidates = match file {
        Value::Array(candidates) => candidates,
        Value::Object(mut object) => match object.remove("candidates") {
            Some(Value::Array(candidates)) => candidates,
            _ => {
                return Err(CliError::Usage(
                    "candidate file needs a `candidates` array".to_owned(),
                ))
            }
        },
        _ => {
            return Err(CliError::Usage(
                "candidate file must hold a JSON array".to_owned(),
            ))
        }
    };
    Ok(json!({
        "election_id": election_id.trim(),
        "candidates": candidates,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_files() {
        let bare = json!([{ "name": "Alice Johnson", "party": "Democratic Party", "age": 52 }]);
        let body = bulk_candidates(" 0f8e0c4e-1b9a-4a55-9c38-8f0e4cbb7a11 ", bare).unwrap();
        assert_eq!(body["election_id"], "0f8e0c4e-1b9a-4a55-9c38-8f0e4cbb7a11");
        assert_eq!(body["candidates"][0]["name"], "Alice Johnson");

        let wrapped = json!({ "candidates": [{ "name": "Robert Smith" }] });
        let body = bulk_candidates("id", wrapped).unwrap();
        assert_eq!(body["candidates"].as_array().unwrap().len(), 1);

        assert!(bulk_candidates("id", json!({ "name": "Alone" })).is_err());
        assert!(bulk_candidates("id", json!("nope")).is_err());
    }
}
