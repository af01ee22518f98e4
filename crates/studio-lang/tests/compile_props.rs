use proptest::prelude::*;
use studio_lang::{compile, Capabilities, DetachedHooks, ObjectMap, RenderNode, Value};

const VALID: &str = r#"
interface Row { label: string; value: number }

const fmt = (n: number) => n.toFixed(1);

export default function Kpi({ rows = [], title = "KPI" }: { rows?: Row[]; title?: string }) {
  const total = rows.reduce((acc, r) => acc + r.value, 0);
  return (
    <div className="kpi">
      <h3>{title}</h3>
      <span>{`${fmt(total)} units`}</span>
      {rows.length === 0 ? <em>No data</em> : null}
    </div>
  );
}
"#;

fn flatten(nodes: &[RenderNode], out: &mut String) {
    for node in nodes {
        match node {
            RenderNode::Text(t) => out.push_str(t),
            RenderNode::Element { tag, children, .. } => {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                flatten(children, out);
            }
        }
    }
}

fn render(src: &str) -> Option<String> {
    let component = compile(src).ok()?.instantiate(&Capabilities::default()).ok()?;
    let nodes = component.render(&Value::object(ObjectMap::new()), &mut DetachedHooks).ok()?;
    let mut out = String::new();
    flatten(&nodes, &mut out);
    Some(out)
}

proptest! {
    #[test]
    fn prop_compile_never_panics_on_arbitrary_text(src in "\\PC{0,200}") {
        let _ = compile(&src);
    }

    #[test]
    fn prop_compile_never_panics_on_truncated_source(cut in 0..VALID.len()) {
        if VALID.is_char_boundary(cut) {
            let _ = compile(&VALID[..cut]);
        }
    }

    #[test]
    fn prop_compile_never_panics_on_token_soup(
        parts in proptest::collection::vec(
            prop_oneof![
                Just("export default"), Just("function"), Just("<div>"), Just("</div>"),
                Just("{"), Just("}"), Just("("), Just(")"), Just("=>"), Just("`${"),
                Just("x"), Just("1"), Just(";"), Just("?."), Just("..."), Just(":"),
                Just("<>"), Just("</>"), Just("const"), Just("="), Just("'s'"),
            ],
            0..40,
        )
    ) {
        let src = parts.join(" ");
        let _ = compile(&src);
    }

    #[test]
    fn prop_deep_nesting_is_rejected_not_crashing(depth in 1usize..400) {
        let src = format!("export default () => {}0{};", "[".repeat(depth), "]".repeat(depth));
        let _ = compile(&src);
    }
}

#[test]
fn same_source_compiles_to_equivalent_factories() {
    let first = render(VALID).expect("renders");
    let second = render(VALID).expect("renders");
    assert_eq!(first, second);
    assert_eq!(first, "<div><h3>KPI<span>0.0 units<em>No data");
}

#[test]
fn failing_sources_always_report_a_message() {
    for src in ["", "export", "export default", "import x from 'y'", "export default <div>", "const = 1"] {
        let err = compile(src).expect_err("must fail");
        assert!(!err.message.is_empty(), "{src:?}");
        assert!(!err.raw_diagnostic.is_empty(), "{src:?}");
    }
}
