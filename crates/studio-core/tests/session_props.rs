//! Properties of the sans-IO session

use proptest::prelude::*;
use studio_core::{extract_code, CompileOutcome, StudioSession};
use studio_lang::compile;
use studio_runtime::{MountOutcome, RenderError, RenderPhase};

const SOURCES: &[&str] = &[
    "export default function A() { return <b>a</b>; }",
    "export default function B() { return <i>b</i>; }",
    "export default function C() { return <div>; }",
    "export default function D() { return Missing(); }",
];

proptest! {
    /// Completions arriving in any order only apply for the current revision
    #[test]
    fn only_the_latest_revision_applies(
        edits in proptest::collection::vec(0..SOURCES.len(), 1..8),
        seed in any::<u64>(),
    ) {
        let mut session = StudioSession::new(3);
        let revisions: Vec<(u64, &str)> = edits
            .iter()
            .map(|&i| (session.edit_source(SOURCES[i]), SOURCES[i]))
            .collect();
        let latest = session.revision();

        let mut shuffled = revisions.clone();
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            let j = usize::try_from((state >> 33) % (i as u64 + 1)).unwrap_or(0);
            shuffled.swap(i, j);
        }
        for (revision, source) in shuffled {
            let outcome = session.compile_finished(revision, &compile(source));
            if revision == latest {
                prop_assert!(!matches!(outcome, CompileOutcome::Stale));
            } else {
                prop_assert_eq!(outcome, CompileOutcome::Stale);
            }
        }
    }

    /// A deterministic failure is corrected at most once per streak
    #[test]
    fn repeated_failure_gets_one_correction(repeats in 1usize..10, cap in 1u32..5) {
        let mut session = StudioSession::new(cap);
        let failure = MountOutcome::RenderError(RenderError::runtime(
            "ReferenceError: Missing is not defined",
            RenderPhase::Mount,
            None,
        ));
        let mut fired = 0;
        for _ in 0..repeats {
            let revision = session.revision();
            if let Some(ticket) = session.mount_finished(revision, &failure) {
                fired += 1;
                let reply = Ok(studio_core::GenerationResponse {
                    code: Some(SOURCES[3].to_string()),
                    explanation: String::new(),
                    raw: String::new(),
                });
                session.generation_finished(ticket.id, reply);
            }
        }
        prop_assert!(fired <= 1);
        prop_assert!(session.attempts().len() <= 1);
    }

    /// A hand edit starts a fresh streak
    #[test]
    fn hand_edit_resets_the_streak(cap in 1u32..4) {
        let mut session = StudioSession::new(cap);
        let failure = MountOutcome::RenderError(RenderError::runtime("TypeError: x", RenderPhase::Mount, None));
        let revision = session.edit_source(SOURCES[0]);
        let first = session.mount_finished(revision, &failure);
        prop_assert!(first.is_some());
        let revision = session.edit_source(SOURCES[1]);
        prop_assert_eq!(session.corrections_in_streak(), 0);
        prop_assert!(session.mount_finished(revision, &failure).is_some());
        prop_assert_eq!(session.corrections_in_streak(), 1);
    }

    /// Extraction never panics on arbitrary replies
    #[test]
    fn extraction_never_panics(reply in "(?s).{0,200}", tag in "(tsx|js|sql|)", close in any::<bool>()) {
        let text = if close {
            format!("{reply}\n```{tag}\n{reply}\n```")
        } else {
            format!("```{tag}\n{reply}")
        };
        let out = extract_code(&text);
        if let Some(code) = out.code {
            prop_assert!(!code.is_empty());
        }
    }
}
