use std::sync::atomic::{AtomicU64, Ordering};

use names::{Generator, Name};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A fresh, human-readable container name, `conquer-<word>-<pid>-<seq>`.
///
/// The pid keeps concurrent judge processes apart; the sequence keeps names
/// distinct within one process even if the generator repeats.
pub fn sandbox_name() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let word = Generator::with_naming(Name::Plain)
        .next()
        .unwrap_or_else(|| "sandbox".into());
    format!("conquer-{}-{}-{}", word, std::process::id(), seq)
}
