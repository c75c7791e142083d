use crate::verifier::*;

const DESC: u64 = 72;

fn config(bounds: u32) -> ProtocolConfig {
    ProtocolConfig {
        descriptor_size: DESC,
        bounds_inference_count: bounds,
        intermediate_bytes: 192,
    }
}

fn fake(addr: usize) -> *const u8 {
    core::ptr::without_provenance(addr)
}

/// Prove: a non-descriptor length is never accepted before output contents
#[kani::proof]
#[kani::unwind(10)]
fn descriptor_stages_reject_other_lengths() {
    let bounds: u32 = kani::any();
    kani::assume(bounds <= 3);
    let prefix: u8 = kani::any();
    kani::assume(prefix as u32 <= bounds + 1);
    let len: u64 = kani::any();
    kani::assume(len != DESC);

    let mut v = AnnotationVerifier::new(config(bounds));
    v.reset(fake(0x1000));
    for _ in 0..prefix {
        kani::assert(v.observe(fake(8), DESC).is_ok(), "descriptor accepted");
    }
    let stage = v.stage();
    kani::assert(v.observe(fake(8), len).is_err(), "wrong length rejected");
    kani::assert(v.is_poisoned(), "violation poisons");
    kani::assert(v.stage() == stage, "violation does not advance");
}

/// Prove: the first output notification must sit at the base
#[kani::proof]
#[kani::unwind(10)]
fn first_output_must_be_base() {
    let base: usize = kani::any();
    let addr: usize = kani::any();
    kani::assume(base > 0 && addr > 0);

    let mut v = AnnotationVerifier::new(config(1));
    v.reset(fake(base));
    kani::assert(v.observe(fake(8), DESC).is_ok(), "bounds");
    kani::assert(v.observe(fake(8), DESC).is_ok(), "intermediate metadata");
    kani::assert(v.observe(fake(8), DESC).is_ok(), "output metadata");
    kani::assert(v.observe(fake(8), 192).is_ok(), "intermediate contents");

    let len: u64 = kani::any();
    let accepted = v.observe(fake(addr), len).is_ok();
    kani::assert(accepted == (addr == base), "accepted iff at base");
    kani::assert(v.reached_output_contents() == accepted, "reached iff accepted");
}

/// Prove: output addresses are accepted iff strictly increasing
#[kani::proof]
#[kani::unwind(10)]
fn output_addresses_strictly_increase() {
    let base: usize = kani::any();
    let next: usize = kani::any();
    kani::assume(base > 0 && next > 0);

    let mut v = AnnotationVerifier::new(config(1));
    v.reset(fake(base));
    for _ in 0..3 {
        kani::assert(v.observe(fake(8), DESC).is_ok(), "metadata");
    }
    kani::assert(v.observe(fake(8), 192).is_ok(), "intermediate contents");
    kani::assert(v.observe(fake(base), 4).is_ok(), "base accepted");

    let accepted = v.observe(fake(next), 4).is_ok();
    kani::assert(accepted == (next > base), "accepted iff increasing");
}

/// Prove: reset always returns to the initial state
#[kani::proof]
#[kani::unwind(10)]
fn reset_restores_initial_state() {
    let steps: u8 = kani::any();
    kani::assume(steps <= 6);

    let mut v = AnnotationVerifier::new(config(2));
    v.reset(fake(0x40));
    for _ in 0..steps {
        let len: u64 = kani::any();
        let _ = v.observe(fake(0x40), len);
    }
    v.reset(fake(0x80));

    kani::assert(
        v.stage() == AnnotateStage::ExpectBoundsInferenceBuffers,
        "initial stage",
    );
    kani::assert(v.bounds_inference_count() == 0, "counter cleared");
    kani::assert(!v.reached_output_contents(), "no output seen");
    kani::assert(!v.is_poisoned(), "not poisoned");
    kani::assert(v.history().is_empty(), "history cleared");
}
