use chrono::{TimeZone, Utc};
use points_cli::{api::verify_proof, AppConfig, AppError, PointsApi};
use points_commit::{to_hex, Address};
use points_ledger::{Action, BalanceFact, Chain, Season};
use tempfile::TempDir;

const ALICE: &str = "0x1111111111111111111111111111111111111111";
const BOB: &str = "0x2222222222222222222222222222222222222222";
const CAROL: &str = "0x3333333333333333333333333333333333333333";
const TOKEN: &str = "admin-token";

fn config(dir: &TempDir) -> AppConfig {
    let json = serde_json::json!({
        "data_dir": dir.path(),
        "admin_token": TOKEN,
        "seasons": [{
            "id": 1,
            "name": "Genesis",
            "starts_at": "2026-01-01T00:00:00Z",
            "ends_at": "2026-04-01T00:00:00Z",
            "multipliers": { "hold": 1.0, "stake": 2.0, "supply": 1.5 }
        }]
    });
    let config: AppConfig = serde_json::from_value(json).unwrap();
    config.validate().unwrap();
    config
}

fn fact(who: &str, action: Action, hour: u32, usd: f64) -> BalanceFact {
    BalanceFact {
        timestamp: Utc.with_ymd_and_hms(2026, 2, 1, hour, 0, 0).unwrap(),
        chain: Chain::Ethereum,
        participant: who.parse().unwrap(),
        action,
        raw_balance: format!("{usd}"),
        usd_value: usd,
        season_id: 1,
    }
}

#[test]
fn accrual_referrals_and_snapshot_end_to_end() {
    let dir = TempDir::new().unwrap();
    let api = PointsApi::open(config(&dir)).unwrap();

    // Alice refers Bob, Bob refers Carol.
    let alice_code = api.create_referral_code(ALICE).unwrap();
    api.link_referral(BOB, &alice_code.code).unwrap();
    let bob_code = api.create_referral_code(BOB).unwrap();
    api.link_referral(CAROL, &bob_code.code.to_lowercase())
        .unwrap();
    assert!(matches!(
        api.link_referral(ALICE, &bob_code.code),
        Err(AppError::Referral(_))
    ));

    // Carol stakes 1000 usd: 1h bootstrap, then a 2h gap.
    api.ingest(vec![
        fact(CAROL, Action::Stake, 0, 1_000.0),
        fact(CAROL, Action::Stake, 2, 1_000.0),
        fact(ALICE, Action::Hold, 0, 500.0),
    ])
    .unwrap();

    let carol = api.participant_summary(CAROL).unwrap();
    assert_eq!(carol.total_points, 6_000.0);
    let bob = api.participant_summary(BOB).unwrap();
    assert_eq!(bob.by_action[&Action::ReferralKickback], 600.0);
    let alice = api.participant_summary(ALICE).unwrap();
    assert_eq!(alice.by_action[&Action::ReferralKickback], 300.0);
    assert_eq!(alice.total_points, 800.0);

    let board = api.leaderboard(None, None).unwrap();
    let order: Vec<String> = board.iter().map(|r| r.participant.to_string()).collect();
    assert_eq!(order, vec![CAROL, ALICE, BOB]);
    assert_eq!(board[0].rank, 1);

    let manifest = api.trigger_snapshot(TOKEN, 1, 19_000_000).unwrap();
    assert_eq!(manifest.total_participants, 3);
    assert_eq!(manifest.total_points, 6_000 + 800 + 600);

    let proof = api.proof(1, CAROL).unwrap();
    assert!(proof.verify());
    assert_eq!(proof.points, 6_000);
    let hex_proof: Vec<String> = proof.proof.iter().map(to_hex).collect();
    assert!(verify_proof(&to_hex(&proof.leaf), &hex_proof, &to_hex(&manifest.merkle_root)).unwrap());

    // Later accrual changes the live ledger, not the published snapshot.
    api.ingest(vec![fact(CAROL, Action::Stake, 4, 1_000.0)])
        .unwrap();
    assert_eq!(api.participant_summary(CAROL).unwrap().total_points, 10_000.0);
    let again = api.proof(1, CAROL).unwrap();
    assert_eq!(again, proof);
    assert_eq!(api.manifest(1).unwrap(), manifest);
}

#[test]
fn snapshot_rejects_bad_token_and_publishes_nothing() {
    let dir = TempDir::new().unwrap();
    let api = PointsApi::open(config(&dir)).unwrap();
    api.ingest(vec![fact(ALICE, Action::Supply, 0, 100.0)])
        .unwrap();

    let err = api.trigger_snapshot("not-the-token", 1, 1).unwrap_err();
    assert_eq!(err.code(), "UNAUTHORIZED");
    assert_eq!(api.latest_manifest().unwrap(), None);
    assert_eq!(api.proof(1, ALICE).unwrap_err().code(), "NOT_FOUND");
}

#[test]
fn state_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let api = PointsApi::open(config(&dir)).unwrap();
        let code = api.create_referral_code(ALICE).unwrap();
        api.link_referral(BOB, &code.code).unwrap();
        api.ingest(vec![fact(BOB, Action::Hold, 0, 100.0)]).unwrap();
        api.trigger_snapshot(TOKEN, 7, 42).unwrap();
    }

    let api = PointsApi::open(config(&dir)).unwrap();
    assert_eq!(api.participant_summary(BOB).unwrap().total_points, 100.0);
    assert_eq!(api.participant_summary(ALICE).unwrap().total_points, 10.0);
    assert_eq!(api.referral_chain(BOB).unwrap(), vec![ALICE.parse::<Address>().unwrap()]);
    assert_eq!(api.referral_metrics().total_links, 1);
    assert_eq!(api.latest_manifest().unwrap().unwrap().snapshot_id, 7);

    // Bob's stream already has a prior fact, so the next one accrues the gap.
    api.ingest(vec![fact(BOB, Action::Hold, 3, 100.0)]).unwrap();
    assert_eq!(api.participant_summary(BOB).unwrap().total_points, 400.0);
}

#[test]
fn duplicate_season_ids_fail_at_startup() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    let duplicate = Season {
        name: "Genesis again".into(),
        ..config.seasons[0].clone()
    };
    config.seasons.push(duplicate);
    assert_eq!(PointsApi::open(config).err().map(|e| e.code()), Some("CONFIGURATION"));
}
