#![no_main]
use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;

use configsync_protocol::address::Address;

/// Fuzz serialized address parsing.
///
/// Tests:
/// - from_serialized never panics on arbitrary strings
/// - Whatever parses survives a serialize / parse cycle unchanged
/// - Community addresses built from arbitrary parts parse back when well formed

#[derive(Arbitrary, Debug)]
struct AddressInput {
    raw: String,
    server_url: String,
    room: String,
}

fuzz_target!(|input: AddressInput| {
    if let Ok(address) = Address::from_serialized(&input.raw) {
        let again = Address::from_serialized(&address.serialize()).unwrap();
        assert_eq!(again, address);
    }

    let community = Address::community(input.server_url.clone(), input.room.clone());
    let parsed = Address::from_serialized(&community.serialize());
    let well_formed = !input.room.is_empty()
        && !input.server_url.is_empty()
        && !input.room.contains('@');
    if well_formed {
        assert_eq!(parsed.unwrap(), community);
    }
});
