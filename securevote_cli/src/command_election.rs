use crate::rest::Api;
use crate::{print_json, Result, Verbosity};
use securevote::{Election, ElectionTally, ReceiptStatus, VoteReceipt};
use serde_json::{json, Value};

pub fn command_elections(api: &Api, verbosity: Verbosity) -> Result {
    let elections: Vec<Election> = api.get("/api/elections")?;
    if verbosity >= Verbosity::Verbose {
        print_json(&elections, verbosity);
        return Ok(());
    }
    if verbosity == Verbosity::Quiet {
        return Ok(());
    }
    for election in &elections {
        println!(
            "{}  {:<8} {} ({} to {})",
            election.id,
            election.status,
            election.title,
            election.start_date.format("%Y-%m-%d"),
            election.end_date.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub fn command_election(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    let id = matches.value_of("ELECTION-ID").unwrap_or_default();
    let res: Value = api.get(&format!("/api/elections/{}", id))?;
    print_json(&res, verbosity);
    Ok(())
}

pub fn command_results(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    let id = matches.value_of("ELECTION-ID").unwrap_or_default();
    let tally: ElectionTally = api.get(&format!("/api/elections/{}/results", id))?;
    if verbosity >= Verbosity::Verbose {
        print_json(&tally, verbosity);
        return Ok(());
    }
    if verbosity == Verbosity::Quiet {
        return Ok(());
    }

    println!("Total votes: {}", tally.total_votes);
    for result in &tally.results {
        println!(
            "{:>6} {:>4}%  {} ({})",
            result.votes, result.percentage, result.candidate.name, result.candidate.party
        );
    }
    Ok(())
}

pub fn command_vote(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    if !api.has_token() {
        return Err(crate::CliError::Usage(
            "voting needs a voter token, log in with `otp verify` first".to_owned(),
        ));
    }
    let body = json!({
        "election_id": matches.value_of("ELECTION-ID").unwrap_or_default(),
        "candidate_id": matches.value_of("CANDIDATE-ID").unwrap_or_default(),
    });
    let receipt: VoteReceipt = api.post("/api/vote", &body)?;
    print_json(&receipt, verbosity);
    Ok(())
}

pub fn command_receipt(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    let receipt = matches.value_of("RECEIPT").unwrap_or_default();
    let status: ReceiptStatus = api.get(&format!("/api/votes/{}", receipt))?;
    print_json(&status, verbosity);
    Ok(())
}
