use rstest::rstest;
use std::sync::Arc;
use xjoin_engine::{Engine, Error, ErrorCode, MemoryResolver, parse_xpath, parse_xquery};

fn engine() -> Engine {
    let resolver = MemoryResolver::new().with_text("f", "<r><a/></r>").with_text("bad", "<r><a></r>");
    Engine::builder().with_resolver(Arc::new(resolver)).build()
}

#[rstest]
#[case(r#"for $x in doc("f")/r return"#, ErrorCode::XPST0003)]
#[case(r#"<a>{"x"}</b>"#, ErrorCode::XQST0118)]
#[case(r#"$missing"#, ErrorCode::XPST0008)]
#[case(r#"doc("nowhere")/r"#, ErrorCode::FODC0002)]
#[case(r#"doc("bad")/r"#, ErrorCode::FODC0006)]
#[case(r#"join(doc("f")/r, doc("f")/r, [a], [])"#, ErrorCode::XPTY0004)]
fn failures_carry_their_code(#[case] src: &str, #[case] code: ErrorCode) {
    let err = engine().evaluate_xquery(src).unwrap_err();
    assert_eq!(err.code(), code, "{err}");
}

#[rstest]
fn syntax_errors_point_at_the_offending_line() {
    let err = parse_xquery("for $x in doc(\"f\")/r\nreturn )").unwrap_err();
    assert!(matches!(err, Error::Syntax { line: 2, .. }), "{err:?}");
    assert!(parse_xpath(r#"doc("f")"#).is_err());
}

#[rstest]
fn tag_mismatch_names_both_tags() {
    assert_eq!(
        parse_xquery(r#"<a>{"x"}</b>"#).unwrap_err(),
        Error::TagMismatch { open: "a".into(), close: "b".into() }
    );
}

#[rstest]
fn structural_mismatches_are_empty_not_errors() {
    let engine = engine();
    assert!(engine.evaluate_xpath(r#"doc("f")/r/a/@id"#).unwrap().is_empty());
    assert!(engine.evaluate_xpath(r#"doc("f")/r/a/text()/b"#).unwrap().is_empty());
    assert!(engine.evaluate_xpath(r#"doc("f")/../r"#).unwrap().is_empty());
}

#[rstest]
fn messages_render_for_users() {
    let err = engine().evaluate_xquery(r#"doc("nowhere")/r"#).unwrap_err();
    assert!(err.to_string().starts_with("cannot load document 'nowhere'"), "{err}");
    assert_eq!(ErrorCode::XPST0008.to_string(), "err:XPST0008");
}
