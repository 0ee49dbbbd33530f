// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// Fuzz target for collection name validation and identifier quoting

#![no_main]

use libfuzzer_sys::fuzz_target;
use modelfree_backend::postgres::{channel_name, quote_ident, validate_collection_name};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let quoted = quote_ident(s);

        // Quoting never leaves an unpaired quote inside the identifier.
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(inner.replace("\"\"", "").matches('"').count(), 0);

        if validate_collection_name(s).is_ok() {
            assert!(s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
            assert!(channel_name(s).len() <= 63);
            assert_eq!(quoted, format!("\"{s}\""));
        }
    }
});
