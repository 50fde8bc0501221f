//! Stress tests for pathological cases
//!
//! These tests verify we don't have accidentally quadratic behavior.

use chrono::{TimeZone, Utc};
use mintgate::auth::{attenuate, Caveat, Decision, Macaroon, RequestContext, RootKey, Verifier};
use mintgate::storage::{MemoryStore, RootKeyStore};
use std::sync::Arc;
use std::time::Instant;

fn ctx() -> RequestContext {
    RequestContext::new("create", Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
}

/// Test that verification time grows linearly with caveat count
#[test]
fn test_caveat_chain_not_quadratic() {
    let caveat_counts = [10, 100, 1_000, 5_000];
    let mut times = vec![];

    for &count in &caveat_counts {
        let store = Arc::new(MemoryStore::new());
        let key = RootKey::generate();
        store.put(b"long-chain", &key).unwrap();

        let mut m = Macaroon::new(&key, b"long-chain".to_vec(), "https://example.com");
        m.add_first_party_caveat(Caveat::valid_methods(&["create"]));
        for i in 1..count {
            m.add_first_party_caveat(Caveat::new("tag", &i.to_string()));
        }
        let token = m.serialize();

        let verifier = Verifier::new(store).with_standard_predicates();
        let ctx = ctx();

        let iterations = 20;
        let start = Instant::now();

        for _ in 0..iterations {
            assert_eq!(verifier.verify(&ctx, &token).unwrap(), Decision::Allowed);
        }

        let elapsed = start.elapsed();
        let per_verify_ns = elapsed.as_nanos() / iterations as u128;
        times.push((count, per_verify_ns));

        println!(
            "Caveats: {:>5}, Verifications: {}, Time: {:?}, Per verify: {}ns",
            count, iterations, elapsed, per_verify_ns
        );
    }

    let (small_count, small_time) = times[0];
    let (large_count, large_time) = times[times.len() - 1];

    let count_ratio = large_count as f64 / small_count as f64;
    let time_ratio = large_time as f64 / small_time.max(1) as f64;

    println!(
        "\nCaveat count ratio: {:.0}x, Time ratio: {:.1}x",
        count_ratio, time_ratio
    );

    // Quadratic would be ~count_ratio²; allow headroom for cache effects
    assert!(
        time_ratio < count_ratio * 10.0,
        "Verification appears to be quadratic! Time grew {:.1}x for {:.0}x more caveats",
        time_ratio,
        count_ratio
    );
}

/// Test that lookups stay flat as the store fills up
#[test]
fn test_verification_with_many_keys() {
    let key_counts = [100, 10_000, 100_000];
    let mut times = vec![];

    for &count in &key_counts {
        let store = Arc::new(MemoryStore::new());
        let mut tokens = Vec::with_capacity(100);

        for i in 0..count {
            let key = RootKey::generate();
            let identifier = format!("key-{:08}", i).into_bytes();
            store.put(&identifier, &key).unwrap();

            if i % (count / 100) == 0 {
                tokens.push(Macaroon::new(&key, identifier, "").serialize());
            }
        }
        assert_eq!(store.len(), count);

        let verifier = Verifier::new(store).with_standard_predicates();
        let ctx = ctx();

        let iterations = 2_000;
        let start = Instant::now();

        for i in 0..iterations {
            let token = &tokens[i % tokens.len()];
            assert!(verifier.verify(&ctx, token).unwrap().is_allowed());
        }

        let elapsed = start.elapsed();
        let per_verify_ns = elapsed.as_nanos() / iterations as u128;
        times.push((count, per_verify_ns));

        println!(
            "Keys: {:>6}, Verifications: {}, Time: {:?}, Per verify: {}ns",
            count, iterations, elapsed, per_verify_ns
        );
    }

    let (small_count, small_time) = times[0];
    let (large_count, large_time) = times[times.len() - 1];

    let count_ratio = large_count as f64 / small_count as f64;
    let time_ratio = large_time as f64 / small_time.max(1) as f64;

    println!(
        "\nKey count ratio: {:.0}x, Time ratio: {:.1}x",
        count_ratio, time_ratio
    );

    // Hash lookups should be roughly constant; anything near linear is a bug
    assert!(
        time_ratio < count_ratio / 10.0,
        "Key lookup appears to scale with store size! Time grew {:.1}x for {:.0}x more keys",
        time_ratio,
        count_ratio
    );
}

/// Test a token passed through many holders, each narrowing it once
#[test]
fn test_long_attenuation_chain() {
    let store = Arc::new(MemoryStore::new());
    let key = RootKey::generate();
    store.put(b"relay", &key).unwrap();

    let mut token = Macaroon::new(&key, b"relay".to_vec(), "https://example.com")
        .with_caveat(Caveat::expires_at(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap()))
        .serialize();

    let start = Instant::now();
    for hop in 0..200 {
        token = attenuate(&token, [Caveat::new("hop", &hop.to_string())]).unwrap();
    }
    token = attenuate(&token, [Caveat::valid_methods(&["create"])]).unwrap();
    println!("200 hops of attenuation: {:?}", start.elapsed());

    let verifier = Verifier::new(store).with_standard_predicates();
    let parsed = Macaroon::deserialize(&token).unwrap();
    assert_eq!(parsed.caveats().len(), 202);

    assert_eq!(verifier.verify(&ctx(), &token).unwrap(), Decision::Allowed);

    let close = RequestContext::new("close", Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    assert!(!verifier.verify(&close, &token).unwrap().is_allowed());
}

/// Test that oversized identifiers and caveats decode without trouble
#[test]
fn test_large_fields() {
    let key = RootKey::generate();
    let identifier = vec![0xAB; 64 * 1024];
    let caveat = Caveat::new("note", &"x".repeat(256 * 1024));

    let m = Macaroon::new(&key, identifier.clone(), "").with_caveat(caveat.clone());

    let start = Instant::now();
    let parsed = Macaroon::deserialize(&m.serialize()).unwrap();
    println!("Decoded {} bytes in {:?}", m.to_bytes().len(), start.elapsed());

    assert_eq!(parsed.identifier(), identifier.as_slice());
    assert_eq!(parsed.caveats(), &[caveat]);
    assert!(parsed.verify_signature(&key));
}
