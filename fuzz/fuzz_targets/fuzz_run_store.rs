//! Fuzz target: stored run decoding
//!
//! Feeds arbitrary bytes to the stored-run decoder and checks:
//! - No panics under arbitrary byte inputs
//! - Anything that decodes also passes structural validation
//! - A decoded run re-encodes to bytes that decode to the same run
//!
//! cargo fuzz run fuzz_run_store

#![no_main]

use inspectline::persistence::{decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(run) = decode(data) else {
        return;
    };
    assert!(run.validate().is_ok(), "decoded run failed validation");

    let bytes = encode(&run).expect("decoded run must re-encode");
    let again = decode(&bytes).expect("re-encoded run must decode");
    assert_eq!(run, again);
});
