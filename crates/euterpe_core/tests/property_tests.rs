//! Property-based tests for the late-fusion engine.
//!
//! Verifies that fused output is always a valid probability distribution,
//! that a lone modality passes through unchanged, and that fusion is
//! deterministic and invariant under weight rescaling.

use euterpe_core::{
    Emotion, EmotionDistribution, FusionConfig, FusionEngine, Modality, ModalityResult,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
// Strategies
// ============================================================================

fn arb_distribution() -> impl Strategy<Value = EmotionDistribution> {
    // Small positive floor keeps every label present and the mass nonzero.
    prop::collection::vec(0.001f32..=1.0, Emotion::ALL.len()).prop_map(|raw| {
        let dist: EmotionDistribution = Emotion::ALL
            .iter()
            .copied()
            .zip(raw)
            .collect();
        dist.normalized()
    })
}

fn arb_result(modality: Modality) -> impl Strategy<Value = ModalityResult> {
    arb_distribution().prop_map(move |dist| {
        let (top, mass) = dist
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .expect("distribution is never empty");
        ModalityResult::new(modality, top, mass).with_probabilities(dist)
    })
}

fn arb_inputs() -> impl Strategy<Value = BTreeMap<Modality, ModalityResult>> {
    (
        arb_result(Modality::Face),
        prop::option::of(arb_result(Modality::Speech)),
        prop::option::of(arb_result(Modality::Text)),
    )
        .prop_map(|(face, speech, text)| {
            let mut inputs = BTreeMap::new();
            inputs.insert(Modality::Face, face);
            if let Some(s) = speech {
                inputs.insert(Modality::Speech, s);
            }
            if let Some(t) = text {
                inputs.insert(Modality::Text, t);
            }
            inputs
        })
}

fn arb_previous() -> impl Strategy<Value = Option<Emotion>> {
    prop::option::of((0..Emotion::ALL.len()).prop_map(|i| Emotion::ALL[i]))
}

fn arb_weights() -> impl Strategy<Value = BTreeMap<Modality, f32>> {
    (0.01f32..=10.0, 0.01f32..=10.0, 0.01f32..=10.0).prop_map(|(f, s, t)| {
        [
            (Modality::Face, f),
            (Modality::Speech, s),
            (Modality::Text, t),
        ]
        .into_iter()
        .collect()
    })
}

fn engine_with(weights: BTreeMap<Modality, f32>) -> FusionEngine {
    let mut config = FusionConfig::default();
    config.weights = weights;
    FusionEngine::new(config)
}

// ============================================================================
// Distribution validity
// ============================================================================

proptest! {
    /// **Core invariant**: the fused output is a probability distribution
    /// (unit mass, every entry finite and within [0, 1]) and the reported
    /// confidence equals the mass on the winning label.
    #[test]
    fn fused_output_is_valid_distribution(
        inputs in arb_inputs(),
        previous in arb_previous(),
        weights in arb_weights(),
    ) {
        let fused = engine_with(weights).fuse(&inputs, previous).unwrap();

        let total = fused.probabilities.total();
        prop_assert!((total - 1.0).abs() < 1e-3, "mass {} not unit", total);

        for (emotion, mass) in fused.probabilities.iter() {
            prop_assert!(mass.is_finite(), "{} mass not finite", emotion);
            prop_assert!((-1e-6..=1.0 + 1e-6).contains(&mass),
                "{} mass out of range: {}", emotion, mass);
        }

        prop_assert!((fused.confidence - fused.probabilities.get(fused.emotion)).abs() < 1e-6,
            "confidence {} != winning mass {}",
            fused.confidence, fused.probabilities.get(fused.emotion));

        // No other label carries more mass than the winner.
        for (_, mass) in fused.probabilities.iter() {
            prop_assert!(mass <= fused.confidence + 1e-6);
        }
    }

    /// **Per-modality breakdown** mirrors the inputs exactly.
    #[test]
    fn per_modality_confidences_match_inputs(
        inputs in arb_inputs(),
        previous in arb_previous(),
    ) {
        let fused = FusionEngine::new(FusionConfig::default())
            .fuse(&inputs, previous)
            .unwrap();
        prop_assert_eq!(fused.per_modality.len(), inputs.len());
        for (modality, result) in &inputs {
            prop_assert_eq!(fused.per_modality[modality], result.confidence);
        }
    }
}

// ============================================================================
// Identity and determinism
// ============================================================================

proptest! {
    /// **Single-modality identity**: with one modality present, the fused
    /// distribution is that modality's own distribution and the confidence
    /// is its top-label mass, whatever the configured weights say about the
    /// absent channels.
    #[test]
    fn single_modality_passes_through(
        result in arb_result(Modality::Face),
        weights in arb_weights(),
    ) {
        let inputs: BTreeMap<_, _> = [(Modality::Face, result.clone())].into_iter().collect();
        let fused = engine_with(weights).fuse(&inputs, None).unwrap();

        let expected = result.distribution();
        for (emotion, mass) in expected.iter() {
            prop_assert!((fused.probabilities.get(emotion) - mass).abs() < 1e-6,
                "{}: {} != {}", emotion, fused.probabilities.get(emotion), mass);
        }
        prop_assert!((fused.confidence - result.confidence).abs() < 1e-5,
            "confidence {} != {}", fused.confidence, result.confidence);
    }

    /// **Determinism**: fusing the same inputs twice yields the same label,
    /// confidence and distribution.
    #[test]
    fn fusion_is_deterministic(
        inputs in arb_inputs(),
        previous in arb_previous(),
        weights in arb_weights(),
    ) {
        let engine = engine_with(weights);
        let a = engine.fuse(&inputs, previous).unwrap();
        let b = engine.fuse(&inputs, previous).unwrap();
        prop_assert_eq!(a.emotion, b.emotion);
        prop_assert_eq!(a.confidence, b.confidence);
        prop_assert_eq!(a.probabilities, b.probabilities);
    }

    /// **Scale invariance**: weights are ratios; multiplying every weight by
    /// the same positive factor cannot change the outcome.
    #[test]
    fn fusion_invariant_under_weight_scaling(
        inputs in arb_inputs(),
        previous in arb_previous(),
        weights in arb_weights(),
        scale in 0.1f32..=100.0,
    ) {
        let scaled: BTreeMap<Modality, f32> =
            weights.iter().map(|(&m, &w)| (m, w * scale)).collect();

        let a = engine_with(weights).fuse(&inputs, previous).unwrap();
        let b = engine_with(scaled).fuse(&inputs, previous).unwrap();

        // Rounding can flip the argmax when two labels sit within an ulp of
        // each other, so only pin the label when the winner has a margin.
        let runner_up = a
            .probabilities
            .iter()
            .filter(|&(e, _)| e != a.emotion)
            .map(|(_, m)| m)
            .fold(f32::NEG_INFINITY, f32::max);
        if a.confidence - runner_up > 1e-4 {
            prop_assert_eq!(a.emotion, b.emotion);
        }
        prop_assert!((a.confidence - b.confidence).abs() < 1e-4,
            "confidence drifted under scaling: {} vs {}", a.confidence, b.confidence);
        for (emotion, mass) in a.probabilities.iter() {
            prop_assert!((b.probabilities.get(emotion) - mass).abs() < 1e-4,
                "{} drifted under scaling", emotion);
        }
    }
}
