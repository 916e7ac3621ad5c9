use crate::rest::Api;
use crate::{print_json, read_json_file, CliError, Result, Verbosity};
use securevote::{OtpStatus, RegistrationSummary, UserCheck};
use serde_json::{json, Value};

pub fn command_otp(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    match matches.subcommand() {
        ("send", Some(m)) => {
            let body = json!({
                "email": m.value_of("EMAIL").unwrap_or_default(),
                "purpose": m.value_of("purpose").unwrap_or("login"),
            });
            let res: Value = api.post("/api/send-otp", &body)?;
            print_json(&res, verbosity);
        }
        ("verify", Some(m)) => {
            let body = json!({
                "email": m.value_of("EMAIL").unwrap_or_default(),
                "otp": m.value_of("OTP").unwrap_or_default(),
                "purpose": m.value_of("purpose").unwrap_or("login"),
            });
            let res: Value = api.post("/api/verify-otp", &body)?;
            print_json(&res, verbosity);
            if let Some(token) = res["token"].as_str() {
                if verbosity >= Verbosity::Normal {
                    eprintln!("export SECUREVOTE_TOKEN={}", token);
                }
            }
        }
        ("status", Some(m)) => {
            let email = m.value_of("EMAIL").unwrap_or_default();
            let status: OtpStatus = api.get(&format!("/api/otp-status/{}", email))?;
            print_json(&status, verbosity);
        }
        _ => {}
    }
    Ok(())
}

pub fn command_check(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    let body = json!({ "email": matches.value_of("EMAIL").unwrap_or_default() });
    let check: UserCheck = api.post("/api/check-user", &body)?;
    print_json(&check, verbosity);
    Ok(())
}

pub fn command_register(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    let registration = read_json_file(matches.value_of("FILE").unwrap_or_default())?;
    let body = registration_request(registration, matches.value_of("otp").unwrap_or_default())?;
    let summary: RegistrationSummary = api.post("/api/complete-registration", &body)?;
    print_json(&summary, verbosity);
    Ok(())
}

/// Wrap the registration file in the request body, taking the email from the file
fn registration_request(registration: Value, otp: &str) -> Result<Value> {
    let email = registration["email"]
        .as_str()
        .ok_or_else(|| CliError::Usage("registration file has no email".to_owned()))?
        .to_owned();
    Ok(json!({
        "email": email,
        "otp": otp.trim(),
        "registration": registration,
    }))
}
