use super::*;
use crate::election::tests::{candidate, general_election};
use crate::registration::tests::application;
use chrono::Duration;

#[test]
fn end_to_end_election() {
    let t = now();
    let mut store = MemStore::default();
    let mut otps = OtpBook::default();
    let mut sessions = SessionBook::default();

    // Create the sealing authority and start the chain
    let (authority_secret, authority_public) = generate_keypair();
    let mut ledger = Ledger::new(&authority_secret, "test-salt", t);
    assert_eq!(ledger.authority(), authority_public);

    // Bootstrap an admin
    let admin = AdminAccount::bootstrap("ADMIN001", "admin@example.org", "changeme", t).unwrap();
    admin.check_login("admin@example.org", "changeme").unwrap();
    store.set_admin(admin.clone());

    // A voter asks for a registration code and registers
    let email = "asha@example.com";
    let code = otps.issue(email, OtpPurpose::Registration, t).unwrap();
    otps.verify(email, &code, OtpPurpose::Registration, t)
        .unwrap();

    let new = application(email);
    new.validate().unwrap();
    ensure_can_register(store.registration_for_email(email).as_ref()).unwrap();
    let mut record = RegistrationRecord::new(new, t);
    store.set_registration(record.clone());

    // Can't log in until approved
    assert!(matches!(
        ensure_can_login(email, store.registration_for_email(email).as_ref()),
        Err(Error::RegistrationNotApproved(RegistrationStatus::Pending))
    ));

    // Admin approves
    record.approve(t).unwrap();
    store.set_registration(record);
    ensure_can_login(email, store.registration_for_email(email).as_ref()).unwrap();

    // Voter logs in with a login code
    let code = otps.issue(email, OtpPurpose::Login, t).unwrap();
    otps.verify(email, &code, OtpPurpose::Login, t).unwrap();
    let session = sessions.issue(
        Role::Voter {
            email: email.to_owned(),
        },
        t,
    );

    // Admin sets up an election with two candidates
    let mut election = Election::new(general_election(t), t).unwrap();
    let batch = vec![
        candidate(election.id, "Alice Johnson", "Democratic Party"),
        candidate(election.id, "Robert Smith", "Republican Party"),
    ];
    for c in candidates_for_election(&election, batch, t).unwrap() {
        store.set_candidate(c);
    }
    store.set_election(election.clone());

    let candidates = store.candidates_for(election.id);
    let robert = candidates
        .iter()
        .find(|c| c.name == "Robert Smith")
        .unwrap()
        .clone();

    // Draft elections don't take votes
    let voter = match sessions.resolve(&session.token, t).unwrap().role {
        Role::Voter { email } => email,
        other => panic!("unexpected role {:?}", other),
    };
    assert!(matches!(
        ledger.cast_vote(&store, election.id, robert.id, &voter, t),
        Err(ValidationError::ElectionNotActive(_))
    ));

    election.start().unwrap();
    store.set_election(election.clone());

    // Vote
    let receipt = ledger
        .cast_vote(&store, election.id, robert.id, &voter, t)
        .unwrap();
    assert_eq!(
        ledger.receipt_status(&receipt.receipt),
        Some(ReceiptStatus::Pending)
    );

    // The ledger never holds the email
    let chain_json = serde_json::to_string(ledger.pending()).unwrap();
    assert!(!chain_json.contains(email));

    // Seal
    let block = ledger
        .seal_block(&authority_secret, t + Duration::seconds(15))
        .unwrap()
        .unwrap();
    assert_eq!(block.index, 1);
    assert!(matches!(
        ledger.receipt_status(&receipt.receipt),
        Some(ReceiptStatus::Sealed { block: 1, .. })
    ));
    ledger.validate_chain().unwrap();

    // Results
    let tally = ledger.tally(election.id, &candidates);
    assert_eq!(tally.total_votes, 1);
    assert_eq!(tally.results[0].candidate.id, robert.id);
    assert_eq!(tally.results[0].percentage, 100);

    // Close the election and confirm no more votes are accepted
    election.stop().unwrap();
    store.set_election(election.clone());
    let mut late = RegistrationRecord::new(application("late@example.com"), t);
    late.approve(t).unwrap();
    store.set_registration(late);
    assert!(ledger
        .cast_vote(&store, election.id, robert.id, "late@example.com", t)
        .is_err());

    // Tamper with the stored chain and check it is caught
    let mut blocks = ledger.blocks().to_vec();
    blocks[1].votes[0].candidate_id = candidates[0].id;
    let tampered = Ledger::from_blocks(blocks, vec![], "test-salt").unwrap();
    assert!(tampered.validate_chain().is_err());
    assert!(!tampered.stats().is_valid);
    assert!(ledger.stats().is_valid);
}

#[test]
fn rejected_voter_can_register_again() {
    let t = now();
    let mut store = MemStore::default();

    let mut first = RegistrationRecord::new(application("ravi@example.com"), t);
    store.set_registration(first.clone());
    assert!(matches!(
        ensure_can_register(store.registration_for_email("ravi@example.com").as_ref()),
        Err(Error::AlreadyRegistered(_, RegistrationStatus::Pending))
    ));

    first.reject(t).unwrap();
    store.set_registration(first);
    ensure_can_register(store.registration_for_email("ravi@example.com").as_ref()).unwrap();

    let second = RegistrationRecord::new(application("ravi@example.com"), t + Duration::seconds(1));
    store.set_registration(second.clone());
    assert_eq!(
        store
            .registration_for_email("ravi@example.com")
            .unwrap()
            .id,
        second.id
    );
    assert_eq!(store.registration_stats().pending, 1);
}
