use rstest::{fixture, rstest};
use std::fs;
use tempfile::TempDir;
use xjoin_engine::{Engine, SerializeOptions, serialize};

#[fixture]
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("f.xml"), "<r>\n  <a><k>1</k></a>\n  <a><k>2</k></a>\n</r>\n").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/g.xml"), "<s><b><j>2</j></b></s>").unwrap();
    dir
}

#[rstest]
fn documents_resolve_against_the_base_dir(workspace: TempDir) {
    let engine = Engine::builder().with_base_dir(workspace.path()).optimize(true).build();
    let out = engine
        .evaluate_xquery(
            r#"for $a in doc("f.xml")/r/a, $b in doc("sub/g.xml")/s/b where $a/k/text() = $b/j/text() return <hit>{$a/k/text()}</hit>"#,
        )
        .unwrap();
    assert_eq!(serialize(&out, &SerializeOptions::default()), "<hit>2</hit>\n");
}

#[rstest]
fn verbose_output_counts_nodes(workspace: TempDir) {
    let engine = Engine::builder().with_base_dir(workspace.path()).build();
    let out = engine.evaluate_xpath(r#"doc("f.xml")//k"#).unwrap();
    assert_eq!(
        serialize(&out, &SerializeOptions { verbose: true, indent: true }),
        "<!-- Number of nodes: 2 -->\n<!-- Node #1 -->\n<k>1</k>\n<!-- Node #2 -->\n<k>2</k>\n"
    );
}

#[rstest]
fn missing_files_are_resource_errors(workspace: TempDir) {
    let engine = Engine::builder().with_base_dir(workspace.path()).build();
    let err = engine.evaluate_xpath(r#"doc("none.xml")/r"#).unwrap_err();
    assert!(matches!(err, xjoin_engine::Error::Resource { .. }));
}
