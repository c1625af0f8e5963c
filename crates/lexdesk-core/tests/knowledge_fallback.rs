use chrono::{Duration, Utc};
use lexdesk_core::{
    knowledge,
    store::Store,
    types::{KnowledgeDocument, GENERAL_AREA},
};

fn open_store() -> Store {
    let store = Store::open(":memory:").expect("open in-memory store");
    store.migrate().expect("migrate");
    store
}

fn doc(store: &Store, id: &str, areas: &[&str], age_minutes: i64) {
    let doc = KnowledgeDocument {
        id: id.into(),
        tenant_id: "t1".into(),
        name: format!("doc {id}"),
        category: "modelos".into(),
        areas: areas.iter().map(|a| a.to_string()).collect(),
        blob_ref: format!("tenants/t1/knowledge/{id}.pdf"),
        created_at: Utc::now() - Duration::minutes(age_minutes),
    };
    store.insert_knowledge(&doc).expect("insert knowledge");
}

#[test]
fn area_tagged_documents_win_over_general_ones() {
    let store = open_store();
    doc(&store, "civ", &["civel"], 10);
    doc(&store, "ger", &[GENERAL_AREA], 5);
    doc(&store, "untagged", &[], 1);

    let refs = knowledge::resolve_context(&store, "t1", Some("civel")).expect("resolve");
    assert_eq!(refs, vec!["tenants/t1/knowledge/civ.pdf"]);
}

#[test]
fn unmatched_area_falls_back_to_general_documents() {
    let store = open_store();
    doc(&store, "civ", &["civel"], 10);
    doc(&store, "ger", &[GENERAL_AREA], 5);
    doc(&store, "untagged", &[], 1);

    let refs = knowledge::resolve_context(&store, "t1", Some("criminal")).expect("resolve");
    assert_eq!(refs, vec!["tenants/t1/knowledge/ger.pdf"]);
}

#[test]
fn no_tag_matches_falls_back_to_most_recent() {
    let store = open_store();
    for i in 0..7 {
        // doc-0 is the newest.
        doc(&store, &format!("doc-{i}"), &[], i * 10);
    }

    let refs = knowledge::resolve_context(&store, "t1", Some("trabalhista")).expect("resolve");
    assert_eq!(refs.len(), 5, "recency tier is capped at 5");
    assert_eq!(refs[0], "tenants/t1/knowledge/doc-0.pdf");
    assert_eq!(refs[4], "tenants/t1/knowledge/doc-4.pdf");
}

#[test]
fn no_area_always_returns_most_recent() {
    let store = open_store();
    doc(&store, "civ", &["civel"], 30);
    doc(&store, "new", &[], 1);

    let refs = knowledge::resolve_context(&store, "t1", None).expect("resolve");
    assert_eq!(
        refs,
        vec![
            "tenants/t1/knowledge/new.pdf",
            "tenants/t1/knowledge/civ.pdf"
        ]
    );
}

#[test]
fn tiers_order_newest_first() {
    let store = open_store();
    doc(&store, "old-civ", &["civel"], 60);
    doc(&store, "new-civ", &["civel"], 5);

    let refs = knowledge::resolve_context(&store, "t1", Some("civel")).expect("resolve");
    assert_eq!(
        refs,
        vec![
            "tenants/t1/knowledge/new-civ.pdf",
            "tenants/t1/knowledge/old-civ.pdf"
        ]
    );
}

#[test]
fn knowledge_is_tenant_scoped() {
    let store = open_store();
    doc(&store, "civ", &["civel"], 10);

    let refs = knowledge::resolve_context(&store, "t2", Some("civel")).expect("resolve");
    assert!(refs.is_empty());
}

#[test]
fn deleted_documents_leave_the_context() {
    let store = open_store();
    doc(&store, "civ", &["civel"], 10);
    assert!(store.delete_knowledge("t1", "civ").expect("delete"));

    let refs = knowledge::resolve_context(&store, "t1", Some("civel")).expect("resolve");
    assert!(refs.is_empty());
}
