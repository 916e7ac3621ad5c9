use crate::rest::Api;
use crate::{print_json, CliError, Result, Verbosity};
use securevote::{Block, BlockSummary, ChainStats};
use serde_json::Value;

pub fn command_health(api: &Api, verbosity: Verbosity) -> Result {
    let res: Value = api.get("/api/health")?;
    print_json(&res, verbosity);
    Ok(())
}

pub fn command_chain(matches: &clap::ArgMatches, api: &Api, verbosity: Verbosity) -> Result {
    match matches.subcommand() {
        ("stats", Some(_)) => {
            let stats: ChainStats = api.get("/api/chain/stats")?;
            print_json(&stats, verbosity);
        }
        ("blocks", Some(m)) => {
            let count: usize = m
                .value_of("count")
                .unwrap_or("10")
                .parse()
                .map_err(|_| CliError::Usage("--count must be a number".to_owned()))?;
            let blocks: Vec<BlockSummary> = api.get(&format!("/api/chain/blocks?count={}", count))?;
            if verbosity >= Verbosity::Verbose {
                print_json(&blocks, verbosity);
            } else if verbosity == Verbosity::Normal {
                for block in &blocks {
                    println!(
                        "#{:<6} {}  {:>4} vote(s)  {}",
                        block.number, block.hash, block.vote_count, block.time_ago
                    );
                }
            }
        }
        ("block", Some(m)) => {
            let index: u64 = m
                .value_of("INDEX")
                .unwrap_or_default()
                .parse()
                .map_err(|_| CliError::Usage("block index must be a number".to_owned()))?;
            let block: Block = api.get(&format!("/api/chain/blocks/{}", index))?;
            print_json(&block, verbosity);

            verify_block(&block)?;
        }
        ("verify", Some(_)) => {
            let res: Value = api.get("/api/chain/verify")?;
            print_json(&res, verbosity);
            if res["valid"] != true {
                return Err(CliError::Usage("chain failed validation".to_owned()));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Check a fetched block on this side too
fn verify_block(block: &Block) -> Result {
    block
        .verify()
        .map_err(|e| CliError::Usage(format!("block {} does not verify: {}", block.index, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use securevote::{generate_keypair, now};

    #[test]
    fn fetched_blocks_are_verified() {
        let (secret, _) = generate_keypair();
        let mut block = Block::seal(&secret, 0, now(), vec![], "0".to_owned());
        verify_block(&block).unwrap();

        block.previous_hash = "1".to_owned();
        match verify_block(&block) {
            Err(CliError::Usage(message)) => assert!(message.contains("block 0")),
            other => panic!("tampered block accepted: {:?}", other.is_ok()),
        }
    }
}
