use crate::*;
use chrono::{DateTime, Utc};
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Previous-hash marker of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A sealed batch of votes, chained to its predecessor by hash and signed by the sealing node
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub votes: Vec<VoteRecord>,
    pub previous_hash: String,
    pub hash: String,

    #[serde(with = "EdPublicKeyHex")]
    pub sealer: VerifyingKey,

    #[serde(with = "EdSignatureHex")]
    pub sig: Signature,
}

// The hashed portion of a block
#[derive(Serialize)]
struct BlockHeader<'a> {
    index: u64,
    timestamp: i64,
    votes: &'a [VoteRecord],
    previous_hash: &'a str,
}

impl Block {
    pub fn compute_hash(
        index: u64,
        timestamp: DateTime<Utc>,
        votes: &[VoteRecord],
        previous_hash: &str,
    ) -> String {
        let header = BlockHeader {
            index,
            timestamp: timestamp.timestamp_millis(),
            votes,
            previous_hash,
        };
        let serialized =
            serde_json::to_vec(&header).expect("securevote: unexpected error serializing block");
        sha256_hex(serialized)
    }

    /// Hash and sign a block
    pub fn seal(
        secret: &SigningKey,
        index: u64,
        timestamp: DateTime<Utc>,
        votes: Vec<VoteRecord>,
        previous_hash: String,
    ) -> Self {
        let hash = Block::compute_hash(index, timestamp, &votes, &previous_hash);
        let sig = secret.sign(hash.as_bytes());
        Block {
            index,
            timestamp,
            votes,
            previous_hash,
            hash,
            sealer: secret.verifying_key(),
            sig,
        }
    }

    /// Check the block's own hash and signature
    pub fn verify(&self) -> Result<(), ValidationError> {
        let expected =
            Block::compute_hash(self.index, self.timestamp, &self.votes, &self.previous_hash);
        if expected != self.hash {
            return Err(ValidationError::HashMismatch(self.index));
        }
        self.sealer.verify_strict(self.hash.as_bytes(), &self.sig)?;
        Ok(())
    }

    pub fn summary(&self, now: DateTime<Utc>) -> BlockSummary {
        BlockSummary {
            number: self.index,
            hash: abbreviate_hash(&self.hash),
            timestamp: self.timestamp,
            vote_count: self.votes.len(),
            time_ago: time_ago(self.timestamp, now),
        }
    }
}

/// Explorer view of a block
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub vote_count: usize,
    pub time_ago: String,
}

/// `0a1b2c3d...eeff` style shortening
pub fn abbreviate_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_owned();
    }
    format!("{}...{}", &hash[..8], &hash[hash.len() - 4..])
}

pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        return "Just now".to_owned();
    }
    if minutes < 60 {
        return format!("{} min ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} hour{} ago", hours, if hours > 1 { "s" } else { "" });
    }
    let days = hours / 24;
    format!("{} day{} ago", days, if days > 1 { "s" } else { "" })
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChainStats {
    pub total_blocks: u64,
    pub total_votes: u64,
    pub pending_votes: u64,
    pub is_valid: bool,
    pub latest_hash: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CandidateResult {
    pub candidate: Candidate,
    pub votes: u64,

    /// Share of all votes in the election, rounded to a whole percent
    pub percentage: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ElectionTally {
    pub election_id: Uuid,
    pub total_votes: u64,
    pub results: Vec<CandidateResult>,
}

/// The vote ledger: sealed blocks plus the pool of votes waiting to be sealed
pub struct Ledger {
    blocks: Vec<Block>,
    pending: Vec<VoteRecord>,
    voter_salt: String,

    // (election, voter hash) pairs that have voted, sealed or pending
    voted: HashSet<(Uuid, String)>,

    // receipt -> block index, None while pending
    receipts: HashMap<String, Option<u64>>,

    // Result of the last full validation. Appended blocks are checked one by one.
    valid: bool,
}

impl Ledger {
    /// Start a new chain with a signed genesis block
    pub fn new(secret: &SigningKey, voter_salt: &str, now: DateTime<Utc>) -> Self {
        let genesis = Block::seal(
            secret,
            0,
            now,
            vec![],
            GENESIS_PREVIOUS_HASH.to_owned(),
        );
        Ledger {
            blocks: vec![genesis],
            pending: vec![],
            voter_salt: voter_salt.to_owned(),
            voted: HashSet::new(),
            receipts: HashMap::new(),
            valid: true,
        }
    }

    /// Rebuild a ledger from stored blocks and pending votes.
    ///
    /// A broken chain still loads; `validate_chain` tells what is wrong with it.
    pub fn from_blocks(
        blocks: Vec<Block>,
        pending: Vec<VoteRecord>,
        voter_salt: &str,
    ) -> Result<Self, ValidationError> {
        if blocks.is_empty() {
            return Err(ValidationError::MissingGenesis);
        }

        let mut ledger = Ledger {
            blocks,
            pending: vec![],
            voter_salt: voter_salt.to_owned(),
            voted: HashSet::new(),
            receipts: HashMap::new(),
            valid: false,
        };

        for block in &ledger.blocks {
            for vote in &block.votes {
                ledger
                    .voted
                    .insert((vote.election_id, vote.voter_hash.clone()));
                ledger.receipts.insert(vote.receipt(), Some(block.index));
            }
        }

        for vote in pending {
            let key = (vote.election_id, vote.voter_hash.clone());
            if ledger.voted.contains(&key) {
                log::warn!(
                    "securevote: dropping pending vote {} for a voter already recorded",
                    vote.receipt()
                );
                continue;
            }
            ledger.voted.insert(key);
            ledger.receipts.insert(vote.receipt(), None);
            ledger.pending.push(vote);
        }

        ledger.valid = ledger.validate_chain().is_ok();
        Ok(ledger)
    }

    pub fn voter_hash(&self, voter_id: &str) -> String {
        hash_voter_id(&self.voter_salt, voter_id)
    }

    pub fn has_voted(&self, election_id: Uuid, voter_hash: &str) -> bool {
        self.voted
            .contains(&(election_id, voter_hash.to_owned()))
    }

    /// Validate a ballot and build its vote record, without recording it
    pub fn prepare_vote<S: Store>(
        &self,
        store: &S,
        election_id: Uuid,
        candidate_id: Uuid,
        voter_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteRecord, ValidationError> {
        validate_ballot(store, election_id, candidate_id, voter_id, now)?;

        let voter_hash = self.voter_hash(voter_id);
        if self.has_voted(election_id, &voter_hash) {
            return Err(ValidationError::AlreadyVoted);
        }

        Ok(VoteRecord {
            voter_hash,
            election_id,
            candidate_id,
            cast_at: now,
        })
    }

    /// Add a prepared vote to the pending pool
    pub fn push_pending(&mut self, vote: VoteRecord) -> Result<VoteReceipt, ValidationError> {
        let key = (vote.election_id, vote.voter_hash.clone());
        if self.voted.contains(&key) {
            return Err(ValidationError::AlreadyVoted);
        }
        let receipt = VoteReceipt::from(&vote);
        self.voted.insert(key);
        self.receipts.insert(receipt.receipt.clone(), None);
        self.pending.push(vote);
        Ok(receipt)
    }

    /// Validate and record a vote in one step
    pub fn cast_vote<S: Store>(
        &mut self,
        store: &S,
        election_id: Uuid,
        candidate_id: Uuid,
        voter_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt, ValidationError> {
        let vote = self.prepare_vote(store, election_id, candidate_id, voter_id, now)?;
        self.push_pending(vote)
    }

    /// Build the next block from the pending pool without appending it.
    /// Returns `None` when nothing is pending.
    pub fn next_block(
        &self,
        secret: &SigningKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Block>, Error> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        if secret.verifying_key() != self.authority() {
            return Err(Error::MismatchedPublicKeys);
        }

        let tip = self.tip();
        let timestamp = if now < tip.timestamp { tip.timestamp } else { now };
        let block = Block::seal(
            secret,
            tip.index + 1,
            timestamp,
            self.pending.clone(),
            tip.hash.clone(),
        );
        Ok(Some(block))
    }

    /// Append a block built by `next_block`, moving its votes out of the pending pool
    pub fn append_block(&mut self, block: Block) -> Result<(), ValidationError> {
        let tip = self.tip();
        if block.index != tip.index + 1 {
            return Err(ValidationError::IndexMismatch {
                expected: tip.index + 1,
                found: block.index,
            });
        }
        if block.previous_hash != tip.hash {
            return Err(ValidationError::BrokenLink(block.index));
        }
        if block.timestamp < tip.timestamp {
            return Err(ValidationError::TimestampRegression(block.index));
        }
        if block.sealer != self.authority() {
            return Err(ValidationError::WrongSealer(block.index));
        }
        block.verify()?;

        let sealed: HashSet<String> = block.votes.iter().map(|v| v.receipt()).collect();
        for vote in &block.votes {
            let receipt = vote.receipt();
            let key = (vote.election_id, vote.voter_hash.clone());
            let already_sealed = matches!(self.receipts.get(&receipt), Some(Some(_)));
            let pending = matches!(self.receipts.get(&receipt), Some(None));
            if already_sealed || (!pending && self.voted.contains(&key)) {
                return Err(ValidationError::DuplicateVote(block.index));
            }
        }

        for vote in &block.votes {
            self.voted
                .insert((vote.election_id, vote.voter_hash.clone()));
            self.receipts.insert(vote.receipt(), Some(block.index));
        }
        self.pending.retain(|v| !sealed.contains(&v.receipt()));
        self.blocks.push(block);
        Ok(())
    }

    /// Seal every pending vote into a new block
    pub fn seal_block(
        &mut self,
        secret: &SigningKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Block>, Error> {
        let block = match self.next_block(secret, now)? {
            Some(block) => block,
            None => return Ok(None),
        };
        self.append_block(block.clone())?;
        Ok(Some(block))
    }

    /// Verify the whole chain, returning the first problem found
    pub fn validate_chain(&self) -> Result<(), ValidationError> {
        let genesis = self.blocks.first().ok_or(ValidationError::MissingGenesis)?;
        if genesis.index != 0
            || genesis.previous_hash != GENESIS_PREVIOUS_HASH
            || !genesis.votes.is_empty()
        {
            return Err(ValidationError::BadGenesis);
        }
        let authority = genesis.sealer;

        let mut seen: HashSet<(Uuid, &str)> = HashSet::new();
        for (position, block) in self.blocks.iter().enumerate() {
            let position = position as u64;
            if block.index != position {
                return Err(ValidationError::IndexMismatch {
                    expected: position,
                    found: block.index,
                });
            }
            if block.sealer != authority {
                return Err(ValidationError::WrongSealer(block.index));
            }
            block.verify()?;

            if position > 0 {
                let previous = &self.blocks[position as usize - 1];
                if block.previous_hash != previous.hash {
                    return Err(ValidationError::BrokenLink(block.index));
                }
                if block.timestamp < previous.timestamp {
                    return Err(ValidationError::TimestampRegression(block.index));
                }
            }

            for vote in &block.votes {
                if !seen.insert((vote.election_id, vote.voter_hash.as_str())) {
                    return Err(ValidationError::DuplicateVote(block.index));
                }
            }
        }

        Ok(())
    }

    /// Count sealed and pending votes for each candidate of an election
    pub fn tally(&self, election_id: Uuid, candidates: &[Candidate]) -> ElectionTally {
        let mut counts: IndexMap<Uuid, u64> = candidates.iter().map(|c| (c.id, 0)).collect();

        for vote in self.votes().filter(|v| v.election_id == election_id) {
            if let Some(count) = counts.get_mut(&vote.candidate_id) {
                *count += 1;
            }
        }

        let total_votes: u64 = counts.values().sum();
        let mut results: Vec<CandidateResult> = candidates
            .iter()
            .map(|candidate| {
                let votes = counts.get(&candidate.id).copied().unwrap_or(0);
                let percentage = if total_votes > 0 {
                    (votes as f64 * 100.0 / total_votes as f64).round() as u32
                } else {
                    0
                };
                CandidateResult {
                    candidate: candidate.clone(),
                    votes,
                    percentage,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.candidate.name.cmp(&b.candidate.name))
        });

        ElectionTally {
            election_id,
            total_votes,
            results,
        }
    }

    /// Every recorded vote, sealed first
    pub fn votes(&self) -> impl Iterator<Item = &VoteRecord> {
        self.blocks
            .iter()
            .flat_map(|b| b.votes.iter())
            .chain(self.pending.iter())
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            total_blocks: self.blocks.len() as u64,
            total_votes: self.blocks.iter().map(|b| b.votes.len() as u64).sum(),
            pending_votes: self.pending.len() as u64,
            is_valid: self.valid,
            latest_hash: self.tip().hash.clone(),
        }
    }

    /// The newest `count` blocks, newest first
    pub fn recent_blocks(&self, count: usize, now: DateTime<Utc>) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .rev()
            .take(count)
            .map(|b| b.summary(now))
            .collect()
    }

    pub fn receipt_status(&self, receipt: &str) -> Option<ReceiptStatus> {
        match self.receipts.get(receipt)? {
            None => Some(ReceiptStatus::Pending),
            Some(index) => {
                let block = self.block(*index)?;
                Some(ReceiptStatus::Sealed {
                    block: block.index,
                    block_hash: block.hash.clone(),
                })
            }
        }
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn pending(&self) -> &[VoteRecord] {
        &self.pending
    }

    /// Number of blocks, genesis included
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn tip(&self) -> &Block {
        // A ledger always holds at least the genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    /// Whether the chain validated when loaded. `append_block` refuses anything that
    /// would change that.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Key that sealed the genesis block
    pub fn authority(&self) -> VerifyingKey {
        self.blocks[0].sealer
    }
}
