#![no_main]
use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;

use configsync_protocol::signing::{StoreRequest, SwarmAuth};

/// Fuzz store request verification with attacker-controlled fields.
/// Must never panic, and a signed request must stop verifying once any
/// signed field is altered.

#[derive(Arbitrary, Debug)]
struct RequestInput {
    seed: [u8; 32],
    namespace: i32,
    timestamp_ms: i64,
    data: Vec<u8>,
    forged_signature: String,
    forged_key: String,
}

fuzz_target!(|input: RequestInput| {
    if input.data.len() > 65536 {
        return;
    }

    let auth = SwarmAuth::for_user(&input.seed);
    let request = auth.store_request(input.namespace, &input.data, 1_000, input.timestamp_ms);
    assert!(request.verify().unwrap());
    assert_eq!(request.decode_data().unwrap(), input.data);

    let mut shifted = request.clone();
    shifted.timestamp_ms = input.timestamp_ms.wrapping_add(1);
    assert!(!shifted.verify().unwrap());

    // Arbitrary encodings: errors are fine, panics are not
    let forged = StoreRequest {
        signature: input.forged_signature,
        pubkey_ed25519: input.forged_key,
        ..request
    };
    let _ = forged.verify();
});
