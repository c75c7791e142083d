fn main() {
    println!("Run with: cargo test");
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashSet};

    use inittrace::runtime::{Dim, StridedView};
    use inittrace::{
        AnnotateStage, AnnotationVerifier, LayoutFactory, LayoutKind, ProtocolConfig,
        ScenarioConfig, ScenarioDriver,
    };
    use inittrace_pipeline::{AccumulatePipeline, contiguous_runs};

    // ============================================================================
    // Layout generation
    // ============================================================================

    /// A non-aliasing layout: dimensions nested in `order` (innermost first),
    /// each followed by `pad` unused elements.
    #[derive(Debug, Clone)]
    struct LayoutRecipe {
        extents: [i32; 3],
        order: [usize; 3],
        pads: [i32; 3],
    }

    impl LayoutRecipe {
        fn dims(&self) -> [Dim; 3] {
            let mut dims = [Dim::new(0, 0, 0); 3];
            let mut stride = 1;
            for &d in &self.order {
                dims[d] = Dim::new(0, self.extents[d], stride);
                stride = stride * self.extents[d] + self.pads[d];
            }
            dims
        }
    }

    fn arb_layout() -> impl Strategy<Value = LayoutRecipe> {
        (
            prop::array::uniform3(1i32..5),
            Just(vec![0usize, 1, 2]).prop_shuffle(),
            prop::array::uniform3(0i32..3),
        )
            .prop_map(|(extents, order, pads)| LayoutRecipe {
                extents,
                order: [order[0], order[1], order[2]],
                pads,
            })
    }

    fn arb_kind() -> impl Strategy<Value = LayoutKind> {
        prop::sample::select(LayoutKind::ALL.to_vec())
    }

    /// Byte offsets of every element of `view`.
    fn element_bytes(view: &StridedView<'_, i32>) -> BTreeSet<usize> {
        let base = view.base().addr();
        view.indices()
            .flat_map(|idx| {
                let start = view.address_of(&idx).addr() - base;
                start..start + 4
            })
            .collect()
    }

    // ============================================================================
    // Views
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn factory_addresses_are_injective(
            (w, h, c) in (1i32..6, 1i32..6, 1i32..5),
            pad in 0i32..4,
            kind in arb_kind(),
        ) {
            let config = ScenarioConfig::default().with_shape(w, h, c).with_pad(pad);
            let factory = LayoutFactory::new(&config);
            let view = factory.build(kind).unwrap();

            let base = view.base().addr();
            let end = base + view.capacity_bytes();
            let mut seen = HashSet::new();
            for idx in view.indices() {
                let addr = view.address_of(&idx).addr();
                prop_assert!(addr >= base && addr + 4 <= end);
                prop_assert!(seen.insert(addr), "{:?} aliases", idx);
            }
            prop_assert_eq!(seen.len(), (w * h * c) as usize);
            prop_assert_eq!(view.element_count(), seen.len());

            // Whatever the enumeration skipped is padding.
            let padding = view.capacity() - seen.len();
            if !kind.is_sparse() || pad == 0 {
                prop_assert_eq!(padding, 0);
            } else {
                prop_assert!(padding > 0);
            }
        }

        #[test]
        fn indices_restart_with_same_set(recipe in arb_layout()) {
            let view = StridedView::<i32>::owned(&recipe.dims()).unwrap();
            let first: HashSet<_> = view.indices().collect();
            let second: HashSet<_> = view.indices().collect();
            prop_assert_eq!(first.len(), view.element_count());
            prop_assert_eq!(first, second);
        }
    }

    // ============================================================================
    // Contiguous runs
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1_000))]

        #[test]
        fn runs_cover_exactly_the_elements(recipe in arb_layout()) {
            let view = StridedView::<i32>::owned(&recipe.dims()).unwrap();
            let runs = contiguous_runs(view.dims(), 4);

            prop_assert_eq!(runs.first().map(|r| r.offset), Some(0));
            for pair in runs.windows(2) {
                prop_assert!(pair[0].offset + pair[0].len <= pair[1].offset);
            }

            let covered: BTreeSet<usize> = runs
                .iter()
                .flat_map(|r| r.offset..r.offset + r.len)
                .collect();
            let total: usize = runs.iter().map(|r| r.len).sum();
            prop_assert_eq!(total, covered.len(), "runs overlap");
            prop_assert_eq!(covered, element_bytes(&view));
        }

        #[test]
        fn dense_layouts_are_one_run(
            extents in prop::array::uniform3(1i32..6),
        ) {
            let view = StridedView::<i32>::dense(&extents).unwrap();
            let runs = contiguous_runs(view.dims(), 4);
            prop_assert_eq!(runs.len(), 1);
            prop_assert_eq!(runs[0].len, view.capacity_bytes());
        }
    }

    // ============================================================================
    // Verifier
    // ============================================================================

    const DESC: u64 = 72;
    const INTERMEDIATE: u64 = 192;

    fn arb_len() -> impl Strategy<Value = u64> {
        prop_oneof![
            4 => Just(DESC),
            1 => Just(INTERMEDIATE),
            1 => 0u64..256,
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1_000))]

        #[test]
        fn verifier_accepts_exactly_the_expected_prefix(
            bounds in 0u32..6,
            lens in prop::collection::vec(arb_len(), 0..16),
        ) {
            let storage = [0u8; 64];
            let base = storage.as_ptr();
            let mut v = AnnotationVerifier::new(ProtocolConfig {
                descriptor_size: DESC,
                bounds_inference_count: bounds,
                intermediate_bytes: INTERMEDIATE,
            });
            v.reset(base);

            let prologue = bounds as usize + 2;
            let expected = |i: usize| match i {
                i if i < prologue => Some(DESC),
                i if i == prologue => Some(INTERMEDIATE),
                _ => None,
            };

            let mut accepted = 0;
            for (i, &len) in lens.iter().enumerate() {
                // Output contents go at base, base+1, ... so addresses increase.
                let ptr = base.wrapping_add(i.saturating_sub(prologue + 1));
                let ok = v.observe(ptr, len).is_ok();
                let should = expected(i).is_none_or(|e| e == len);
                prop_assert_eq!(ok, should, "notification {} of length {}", i, len);
                if !ok {
                    prop_assert!(v.is_poisoned());
                    break;
                }
                accepted += 1;
            }

            prop_assert_eq!(v.history().len(), accepted);
            prop_assert_eq!(
                v.reached_output_contents(),
                accepted > prologue + 1
            );
            if accepted > prologue {
                prop_assert_eq!(v.stage(), AnnotateStage::ExpectOutputContents);
            }
        }
    }

    // ============================================================================
    // Whole scenarios
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn reference_pipeline_passes_for_any_padding(pad in 0i32..5, kind in arb_kind()) {
            let config = ScenarioConfig::default().with_pad(pad);
            let mut driver = ScenarioDriver::new(AccumulatePipeline::new(), config);
            let report = driver.run(kind).unwrap();
            prop_assert_eq!(report.checksum, 912);
            let coverage = report.coverage.unwrap();
            prop_assert_eq!(coverage.elements, 48);
            prop_assert_eq!(coverage.initialized_bytes, 192);
        }
    }
}
