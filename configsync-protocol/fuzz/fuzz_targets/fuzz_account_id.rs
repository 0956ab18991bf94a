#![no_main]
use libfuzzer_sys::fuzz_target;

use configsync_protocol::ids::AccountId;

/// Fuzz account id parsing.
///
/// Must never panic on arbitrary input; anything that parses must
/// re-encode to the same (lowercased) string.
fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(id) = AccountId::from_hex(s) {
        assert_eq!(id.to_hex(), s.to_ascii_lowercase());
        assert_eq!(AccountId::from_hex(&id.to_hex()).unwrap(), id);
    }
});
