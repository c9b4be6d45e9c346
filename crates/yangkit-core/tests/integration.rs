//! Integration tests compiling YIN documents end to end.

use std::collections::HashMap;

use yangkit_core::context::{Context, ModuleLocator};
use yangkit_core::diag::{Severity, ValidationCode};
use yangkit_core::error::Error;
use yangkit_core::schema::{
    Config, IdentRef, ModuleHandle, NodeKind, NodePayload, Status, TpdfRef, TypeBase, TypeDer,
    TypeInfo,
};
use yangkit_core::xml::DumpOpts;

const YIN_NS: &str = "urn:ietf:params:xml:ns:yang:yin:1";

/// Wrap statements into a minimal module skeleton.
fn module(name: &str, body: &str) -> String {
    format!(
        "<module name=\"{name}\" xmlns=\"{YIN_NS}\">\
         <namespace uri=\"urn:{name}\"/><prefix value=\"{name}\"/>{body}</module>"
    )
}

fn last_code(ctx: &Context) -> Option<ValidationCode> {
    ctx.last_error().and_then(|d| d.code)
}

/// In-memory locator keyed by `name` or `name@revision`.
struct MemLocator(HashMap<String, String>);

impl MemLocator {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl ModuleLocator for MemLocator {
    fn locate(
        &self,
        _searchpath: Option<&str>,
        name: &str,
        revision: Option<&str>,
    ) -> Result<Option<String>, String> {
        let key = match revision {
            Some(rev) => format!("{name}@{rev}"),
            None => name.to_string(),
        };
        Ok(self.0.get(&key).cloned())
    }
}

#[test]
fn minimal_module() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module("m", "<leaf name=\"x\"><type name=\"string\"/></leaf>"))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    assert_eq!(ctx.dict().get(m.name), "m");
    assert_eq!(m.namespace.map(|n| ctx.dict().get(n)), Some("urn:m"));
    assert_eq!(m.prefix.map(|p| ctx.dict().get(p)), Some("m"));
    assert!(m.implemented);

    let x = m.data.expect("one data node");
    let node = m.node(x);
    assert_eq!(ctx.dict().get(node.name), "x");
    assert_eq!(node.kind(), NodeKind::Leaf);
    assert_eq!(node.config, Config::Write);
    assert_eq!(node.status, Status::Current);
    let ty = node.leaf_type().unwrap();
    assert_eq!(ty.base, TypeBase::String);
    assert_eq!(ty.der, TypeDer::Builtin);
    assert!(node.next.is_none());

    let (doc, dict) = ctx.info();
    let out = doc.dump_mem(&dict, doc.root().unwrap(), DumpOpts::default());
    assert_eq!(
        out,
        "<modules xmlns=\"urn:ietf:params:xml:ns:yang:ietf-yang-library\">\
         <module-set-id>1</module-set-id>\
         <module><name>m</name><revision></revision><namespace>urn:m</namespace>\
         <conformance>implement</conformance></module></modules>"
    );
}

#[test]
fn module_header_statements() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "hdr",
            "<yang-version value=\"1\"/>\
             <description><text>a module</text></description>\
             <organization><text>org</text></organization>\
             <contact><text>who</text></contact>\
             <revision date=\"2015-07-03\"><description><text>first</text></description></revision>\
             <revision date=\"2015-01-01\"/>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    assert_eq!(m.version, 1);
    assert_eq!(m.dsc.map(|d| ctx.dict().get(d)), Some("a module"));
    assert_eq!(m.organization.map(|d| ctx.dict().get(d)), Some("org"));
    assert_eq!(m.revisions.len(), 2);
    assert_eq!(ctx.dict().get(m.revisions[0].date), "2015-07-03");
    let newest = m.newest_revision(ctx.dict()).unwrap();
    assert_eq!(ctx.dict().get(newest), "2015-07-03");
}

#[test]
fn missing_namespace_fails() {
    let mut ctx = Context::new();
    let err = ctx
        .parse_module(&format!(
            "<module name=\"m\" xmlns=\"{YIN_NS}\"><prefix value=\"m\"/></module>"
        ))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(last_code(&ctx), Some(ValidationCode::MissingStatement));
    assert!(ctx.module_names().is_empty());
}

#[test]
fn enum_auto_assignment() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "e",
            "<leaf name=\"l\"><type name=\"enumeration\">\
             <enum name=\"a\"/>\
             <enum name=\"b\"><value value=\"5\"/></enum>\
             <enum name=\"c\"/>\
             </type></leaf>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let node = m.node(m.data.unwrap());
    let TypeInfo::Enums(enums) = &node.leaf_type().unwrap().info else {
        panic!("expected enum payload");
    };
    let values: Vec<(&str, i32)> = enums
        .iter()
        .map(|e| (ctx.dict().get(e.name), e.value))
        .collect();
    assert_eq!(values, [("a", 0), ("b", 5), ("c", 6)]);
}

#[test]
fn enum_duplicate_value_fails() {
    let mut ctx = Context::new();
    let err = ctx
        .parse_module(&module(
            "e",
            "<leaf name=\"l\"><type name=\"enumeration\">\
             <enum name=\"a\"><value value=\"1\"/></enum>\
             <enum name=\"b\"><value value=\"1\"/></enum>\
             </type></leaf>",
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(last_code(&ctx), Some(ValidationCode::DuplicateEnumValue));
}

#[test]
fn enum_duplicate_name_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "e",
        "<leaf name=\"l\"><type name=\"enumeration\">\
         <enum name=\"a\"/><enum name=\"a\"/></type></leaf>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::DuplicateEnumName));
}

#[test]
fn enum_whitespace_name_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "e",
        "<leaf name=\"l\"><type name=\"enumeration\">\
         <enum name=\" a\"/></type></leaf>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::EnumNameWhitespace));
}

#[test]
fn enum_auto_assignment_overflow_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "e",
        "<leaf name=\"l\"><type name=\"enumeration\">\
         <enum name=\"a\"><value value=\"2147483647\"/></enum>\
         <enum name=\"b\"/></type></leaf>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::InvalidArgument));
}

#[test]
fn enum_value_out_of_range_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "e",
        "<leaf name=\"l\"><type name=\"enumeration\">\
         <enum name=\"a\"><value value=\"2147483648\"/></enum></type></leaf>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::InvalidArgument));
}

#[test]
fn list_key_binding() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "lst",
            "<list name=\"l\"><key value=\"k\"/>\
             <leaf name=\"k\"><type name=\"string\"/></leaf>\
             <leaf name=\"v\"><type name=\"string\"/></leaf></list>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let list = m.node(m.data.unwrap());
    assert_eq!(list.kind(), NodeKind::List);
    let NodePayload::List { keys, .. } = &list.payload else {
        panic!("expected list payload");
    };
    assert_eq!(keys.len(), 1);
    let key = m.node(keys[0]);
    assert_eq!(ctx.dict().get(key.name), "k");
    assert_eq!(key.kind(), NodeKind::Leaf);
}

#[test]
fn list_key_type_empty_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "lst",
        "<list name=\"l\"><key value=\"k\"/>\
         <leaf name=\"k\"><type name=\"empty\"/></leaf></list>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::KeyTypeEmpty));
}

#[test]
fn config_list_without_key_fails() {
    let mut ctx = Context::new();
    let err = ctx
        .parse_module(&module(
            "lst",
            "<list name=\"l\"><leaf name=\"k\"><type name=\"string\"/></leaf></list>",
        ))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(last_code(&ctx), Some(ValidationCode::MissingStatement));
}

#[test]
fn state_list_without_key_is_fine() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "lst",
            "<list name=\"l\"><config value=\"false\"/>\
             <leaf name=\"v\"><type name=\"string\"/></leaf></list>",
        ))
        .expect("compile");
    let m = ctx.module(id).unwrap();
    assert_eq!(m.node(m.data.unwrap()).config, Config::Read);
}

#[test]
fn list_key_unknown_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "lst",
        "<list name=\"l\"><key value=\"missing\"/>\
         <leaf name=\"k\"><type name=\"string\"/></leaf></list>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::MissingKey));
}

#[test]
fn list_duplicate_key_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "lst",
        "<list name=\"l\"><key value=\"k k\"/>\
         <leaf name=\"k\"><type name=\"string\"/></leaf></list>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::DuplicateKey));
}

#[test]
fn list_key_config_mismatch_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "lst",
        "<list name=\"l\"><key value=\"k\"/>\
         <leaf name=\"k\"><config value=\"false\"/><type name=\"string\"/></leaf></list>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::KeyConfigMismatch));
}

#[test]
fn identity_derivation() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "idn",
            "<identity name=\"base-idn\"/>\
             <identity name=\"a\"><base name=\"base-idn\"/></identity>\
             <identity name=\"b\"><base name=\"a\"/></identity>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    assert_eq!(m.identities.len(), 3);
    let handle = m.handle;
    let ident_ref = |index: u32| IdentRef {
        owner: handle,
        index,
    };

    // base.derived contains {a, b}; a.derived contains {b}
    assert_eq!(m.identities[0].derived, [ident_ref(1), ident_ref(2)]);
    assert_eq!(m.identities[1].derived, [ident_ref(2)]);
    assert_eq!(m.identities[1].base, Some(ident_ref(0)));
    assert_eq!(m.identities[2].base, Some(ident_ref(1)));
    assert!(m.identities[0].base.is_none());
}

#[test]
fn identity_forward_reference() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "idn",
            "<identity name=\"derived-idn\"><base name=\"late\"/></identity>\
             <identity name=\"late\"/>",
        ))
        .expect("forward references within a module are legal");
    let m = ctx.module(id).unwrap();
    assert_eq!(
        m.identities[0].base,
        Some(IdentRef {
            owner: m.handle,
            index: 1
        })
    );
    assert_eq!(m.identities[1].derived.len(), 1);
}

#[test]
fn identity_cycle_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "idn",
        "<identity name=\"a\"><base name=\"b\"/></identity>\
         <identity name=\"b\"><base name=\"a\"/></identity>",
    ))
    .unwrap_err();
}

#[test]
fn identityref_type() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "idn",
            "<identity name=\"crypto\"/>\
             <leaf name=\"l\"><type name=\"identityref\"><base name=\"crypto\"/></type></leaf>",
        ))
        .expect("compile");
    let m = ctx.module(id).unwrap();
    let node = m.node(m.data.unwrap());
    let TypeInfo::Identityref(base) = &node.leaf_type().unwrap().info else {
        panic!("expected identityref payload");
    };
    assert_eq!(*base, IdentRef { owner: m.handle, index: 0 });
}

#[test]
fn cross_module_typedef() {
    let mut ctx = Context::new();
    let p = ctx
        .parse_module(&module(
            "p",
            "<typedef name=\"t\"><type name=\"uint32\"/></typedef>",
        ))
        .expect("compile p");
    let q = ctx
        .parse_module(&module(
            "q",
            "<import module=\"p\"><prefix value=\"pp\"/></import>\
             <leaf name=\"n\"><type name=\"pp:t\"/></leaf>",
        ))
        .expect("compile q");

    let qm = ctx.module(q).unwrap();
    assert_eq!(qm.imports.len(), 1);
    assert_eq!(qm.imports[0].module, p);

    let n = qm.node(qm.data.unwrap());
    let ty = n.leaf_type().unwrap();
    assert_eq!(ty.base, TypeBase::Uint32);
    assert_eq!(ty.der, TypeDer::Tpdf(TpdfRef::Top(ModuleHandle::Module(p), 0)));
    assert_eq!(ty.prefix.map(|p| ctx.dict().get(p)), Some("pp"));
}

#[test]
fn local_typedef_scope() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "scp",
            "<container name=\"c\">\
             <typedef name=\"local\"><type name=\"int8\"/></typedef>\
             <leaf name=\"l\"><type name=\"local\"/></leaf>\
             </container>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let c = m.data.unwrap();
    let l = m.node(c).child.unwrap();
    let ty = m.node(l).leaf_type().unwrap();
    assert_eq!(ty.base, TypeBase::Int8);
    assert_eq!(
        ty.der,
        TypeDer::Tpdf(TpdfRef::Node(ModuleHandle::Module(id), c, 0))
    );
}

#[test]
fn typedef_chain_terminates_at_builtin() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "chn",
            "<typedef name=\"t1\"><type name=\"uint16\"/></typedef>\
             <typedef name=\"t2\"><type name=\"t1\"/></typedef>\
             <leaf name=\"l\"><type name=\"t2\"/></leaf>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let mut der = m.node(m.data.unwrap()).leaf_type().unwrap().der;
    let mut steps = 0;
    while let TypeDer::Tpdf(TpdfRef::Top(_, i)) = der {
        der = m.typedefs[i as usize].ty.der;
        steps += 1;
        assert!(steps < 10, "derivation chain must terminate");
    }
    assert_eq!(der, TypeDer::Builtin);
    assert_eq!(steps, 2);
}

#[test]
fn unknown_type_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "bad",
        "<leaf name=\"l\"><type name=\"no-such-type\"/></leaf>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::InvalidArgument));
}

#[test]
fn unknown_prefix_fails() {
    let mut ctx = Context::new();
    let err = ctx
        .parse_module(&module(
            "bad",
            "<leaf name=\"l\"><type name=\"nope:t\"/></leaf>",
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Unresolved(_)));
    assert_eq!(last_code(&ctx), Some(ValidationCode::UnresolvedPrefix));
}

#[test]
fn config_inheritance() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "inh",
            "<container name=\"state\"><config value=\"false\"/>\
             <leaf name=\"l\"><type name=\"string\"/></leaf>\
             <container name=\"nested\"><leaf name=\"deep\"><type name=\"string\"/></leaf></container>\
             </container>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let state = m.data.unwrap();
    assert_eq!(m.node(state).config, Config::Read);
    for child in m.children(Some(state)) {
        assert_eq!(m.node(child).config, Config::Read);
    }
    let nested = m
        .find_child(Some(state), ctx.dict().find("nested").unwrap(), &[])
        .unwrap();
    let deep = m.node(nested).child.unwrap();
    assert_eq!(m.node(deep).config, Config::Read);
}

#[test]
fn uses_resolves_grouping() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "grp",
            "<grouping name=\"g\"><leaf name=\"gl\"><type name=\"string\"/></leaf></grouping>\
             <container name=\"c\"><uses name=\"g\"/></container>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let g = m.data.unwrap();
    assert_eq!(m.node(g).kind(), NodeKind::Grouping);
    let c = m.node(g).next.unwrap();
    let uses = m.node(c).child.unwrap();
    let NodePayload::Uses { grouping, .. } = &m.node(uses).payload else {
        panic!("expected uses payload");
    };
    assert_eq!(
        *grouping,
        Some(yangkit_core::schema::GrpRef {
            owner: m.handle,
            node: g
        })
    );
}

#[test]
fn uses_inside_grouping_stays_unresolved() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "grp",
            "<grouping name=\"outer\"><uses name=\"defined-elsewhere\"/></grouping>",
        ))
        .expect("a uses inside a grouping defers binding");
    let m = ctx.module(id).unwrap();
    let uses = m.node(m.data.unwrap()).child.unwrap();
    let NodePayload::Uses { grouping, .. } = &m.node(uses).payload else {
        panic!("expected uses payload");
    };
    assert!(grouping.is_none());
}

#[test]
fn uses_unknown_grouping_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "grp",
        "<container name=\"c\"><uses name=\"nope\"/></container>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::InvalidArgument));
}

#[test]
fn choice_with_cases() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "cho",
            "<choice name=\"proto\"><default value=\"tcp\"/>\
             <case name=\"tcp\"><leaf name=\"tcp-port\"><type name=\"uint16\"/></leaf></case>\
             <case name=\"udp\"><leaf name=\"udp-port\"><type name=\"uint16\"/></leaf></case>\
             <anyxml name=\"raw\"/>\
             </choice>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let choice = m.node(m.data.unwrap());
    assert_eq!(choice.kind(), NodeKind::Choice);
    let NodePayload::Choice { default } = &choice.payload else {
        panic!("expected choice payload");
    };
    assert_eq!(default.map(|d| ctx.dict().get(d)), Some("tcp"));

    let kinds: Vec<NodeKind> = m
        .children(m.data)
        .map(|c| m.node(c).kind())
        .collect();
    assert_eq!(kinds, [NodeKind::Case, NodeKind::Case, NodeKind::AnyXml]);
}

#[test]
fn leaf_list_and_list_extras() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "ext",
            "<leaf-list name=\"ll\"><type name=\"string\"/><units name=\"bits\"/>\
             <min-elements value=\"1\"/><max-elements value=\"8\"/>\
             <ordered-by value=\"user\"/></leaf-list>\
             <list name=\"l\"><key value=\"k\"/><max-elements value=\"unbounded\"/>\
             <leaf name=\"k\"><type name=\"string\"/></leaf></list>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let ll = m.data.unwrap();
    let node = m.node(ll);
    assert!(node.ordered_by_user);
    let NodePayload::LeafList {
        units,
        min_elements,
        max_elements,
        ..
    } = &node.payload
    else {
        panic!("expected leaf-list payload");
    };
    assert_eq!(units.map(|u| ctx.dict().get(u)), Some("bits"));
    assert_eq!(*min_elements, 1);
    assert_eq!(*max_elements, Some(8));

    let l = m.node(ll).next.unwrap();
    let NodePayload::List { max_elements, .. } = &m.node(l).payload else {
        panic!("expected list payload");
    };
    assert_eq!(*max_elements, None);
}

#[test]
fn presence_and_mandatory() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "pm",
            "<container name=\"c\"><presence value=\"enables it\"/></container>\
             <leaf name=\"l\"><type name=\"string\"/><mandatory value=\"true\"/></leaf>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let c = m.data.unwrap();
    let NodePayload::Container { presence, .. } = &m.node(c).payload else {
        panic!("expected container payload");
    };
    assert!(*presence);
    let l = m.node(c).next.unwrap();
    assert!(m.node(l).mandatory);
}

#[test]
fn duplicate_sibling_names_fail() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "dup",
        "<leaf name=\"x\"><type name=\"string\"/></leaf>\
         <leaf name=\"x\"><type name=\"int8\"/></leaf>",
    ))
    .unwrap_err();
    assert_eq!(last_code(&ctx), Some(ValidationCode::DuplicateNodeName));
}

#[test]
fn duplicate_module_rejected_and_state_unchanged() {
    let text = module("dup", "<leaf name=\"x\"><type name=\"string\"/></leaf>");
    let mut ctx = Context::new();
    ctx.parse_module(&text).expect("first load");
    let names_before = ctx.module_names().len();
    let (doc, dict) = ctx.info();
    let info_before = doc.dump_mem(&dict, doc.root().unwrap(), DumpOpts::default());

    let err = ctx.parse_module(&text).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(last_code(&ctx), Some(ValidationCode::DuplicateModule));

    assert_eq!(ctx.module_names().len(), names_before);
    let (doc, dict) = ctx.info();
    let info_after = doc.dump_mem(&dict, doc.root().unwrap(), DumpOpts::default());
    assert_eq!(info_before, info_after);
}

#[test]
fn same_name_different_revision_allowed() {
    let mut ctx = Context::new();
    ctx.parse_module(&module("r", "<revision date=\"2015-01-01\"/>"))
        .expect("first revision");
    ctx.parse_module(&module("r", "<revision date=\"2015-07-03\"/>"))
        .expect("second revision");

    // with no revision requested, the newest wins
    let m = ctx.get_module("r", None).unwrap();
    let newest = m.newest_revision(ctx.dict()).unwrap();
    assert_eq!(ctx.dict().get(newest), "2015-07-03");
    let m = ctx.get_module("r", Some("2015-01-01")).unwrap();
    let newest = m.newest_revision(ctx.dict()).unwrap();
    assert_eq!(ctx.dict().get(newest), "2015-01-01");
}

#[test]
fn self_import_fails() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "selfish",
        "<import module=\"selfish\"><prefix value=\"s\"/></import>",
    ))
    .unwrap_err();
    assert!(ctx.get_module("selfish", None).is_none());
}

#[test]
fn failed_parse_releases_all_dictionary_refs() {
    let mut ctx = Context::new();
    ctx.parse_module(&module(
        "leak",
        "<container name=\"c\"><leaf name=\"l\"><type name=\"enumeration\">\
         <enum name=\"a\"><value value=\"1\"/></enum>\
         <enum name=\"b\"><value value=\"1\"/></enum>\
         </type></leaf></container>",
    ))
    .unwrap_err();
    assert!(
        ctx.dict().is_empty(),
        "a failed compile must release every interned string"
    );
}

#[test]
fn import_loads_through_locator() {
    let dep = module("dep", "<typedef name=\"t\"><type name=\"boolean\"/></typedef>");
    let mut ctx = Context::new();
    ctx.set_locator(Box::new(MemLocator::new(&[("dep", &dep)])));

    let id = ctx
        .parse_module(&module(
            "top",
            "<import module=\"dep\"><prefix value=\"d\"/></import>\
             <leaf name=\"flag\"><type name=\"d:t\"/></leaf>",
        ))
        .expect("import triggers a locator load");

    let dep_module = ctx.get_module("dep", None).expect("dep registered");
    assert!(!dep_module.implemented, "import dependency has import conformance");
    assert!(ctx.module(id).unwrap().implemented);

    let (doc, dict) = ctx.info();
    let out = doc.dump_mem(&dict, doc.root().unwrap(), DumpOpts::default());
    assert!(out.contains("<name>dep</name><revision></revision><namespace>urn:dep</namespace><conformance>import</conformance>"));
}

#[test]
fn missing_import_fails() {
    let mut ctx = Context::new();
    let err = ctx
        .parse_module(&module(
            "top",
            "<import module=\"absent\"><prefix value=\"a\"/></import>",
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(ctx.get_module("top", None).is_none());
}

#[test]
fn submodule_include() {
    let sub = format!(
        "<submodule name=\"sub\" xmlns=\"{YIN_NS}\">\
         <belongs-to module=\"main\"><prefix value=\"mn\"/></belongs-to>\
         <typedef name=\"mytype\"><type name=\"int32\"/></typedef>\
         </submodule>"
    );
    let mut ctx = Context::new();
    ctx.set_locator(Box::new(MemLocator::new(&[("sub", &sub)])));

    let id = ctx
        .parse_module(&format!(
            "<module name=\"main\" xmlns=\"{YIN_NS}\">\
             <namespace uri=\"urn:main\"/><prefix value=\"mn\"/>\
             <include module=\"sub\"/>\
             <leaf name=\"x\"><type name=\"mytype\"/></leaf></module>"
        ))
        .expect("compile with include");

    let m = ctx.module(id).unwrap();
    assert_eq!(m.includes.len(), 1);
    let sub = ctx.get_submodule(id, "sub", None).expect("submodule registered");
    assert_eq!(sub.belongs_to, Some(id));

    // the leaf's type resolves through the included submodule's typedefs
    let ty = m.node(m.data.unwrap()).leaf_type().unwrap();
    assert_eq!(ty.base, TypeBase::Int32);
    assert!(matches!(
        ty.der,
        TypeDer::Tpdf(TpdfRef::Top(ModuleHandle::Submodule(_), 0))
    ));

    let (doc, dict) = ctx.info();
    let out = doc.dump_mem(&dict, doc.root().unwrap(), DumpOpts::default());
    assert!(out.contains("<submodules><submodule><name>sub</name><revision></revision></submodule></submodules>"));
}

#[test]
fn submodule_wrong_owner_fails() {
    let sub = format!(
        "<submodule name=\"sub\" xmlns=\"{YIN_NS}\">\
         <belongs-to module=\"other\"><prefix value=\"o\"/></belongs-to></submodule>"
    );
    let mut ctx = Context::new();
    ctx.set_locator(Box::new(MemLocator::new(&[("sub", &sub)])));
    ctx.parse_module(&module("main", "<include module=\"sub\"/>"))
        .unwrap_err();
}

#[test]
fn features() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "ft",
            "<feature name=\"compression\"><description><text>zip</text></description></feature>\
             <feature name=\"encryption\"/>",
        ))
        .expect("compile");

    {
        let m = ctx.module(id).unwrap();
        let (names, states) = m.features_list();
        let names: Vec<&str> = names.iter().map(|n| ctx.dict().get(*n)).collect();
        assert_eq!(names, ["compression", "encryption"]);
        assert_eq!(states, [false, false]);
    }

    ctx.feature_enable(id, "compression").unwrap();
    let (_, states) = ctx.module(id).unwrap().features_list();
    assert_eq!(states, [true, false]);

    ctx.feature_enable(id, "*").unwrap();
    let (_, states) = ctx.module(id).unwrap().features_list();
    assert_eq!(states, [true, true]);

    ctx.feature_disable(id, "encryption").unwrap();
    let (_, states) = ctx.module(id).unwrap().features_list();
    assert_eq!(states, [true, false]);

    assert!(ctx.feature_enable(id, "no-such-feature").is_err());
}

#[test]
fn foreign_namespace_statement_skipped_with_warning() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "ext",
            "<x:custom xmlns:x=\"urn:vendor\"/>\
             <leaf name=\"l\"><type name=\"string\"/></leaf>",
        ))
        .expect("extension statements are skipped");
    assert!(ctx.module(id).unwrap().data.is_some());
    assert!(ctx
        .diagnostics()
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("foreign namespace")));
}

#[test]
fn verbose_diagnostics_report_progress() {
    let mut ctx = Context::new();
    ctx.set_verbosity(Severity::Verbose);
    ctx.parse_module(&module("v", "")).expect("compile");
    let messages: Vec<&str> = ctx
        .diagnostics()
        .iter()
        .filter(|d| d.severity == Severity::Verbose)
        .map(|d| d.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("reading module v")));
    assert!(messages.iter().any(|m| m.contains("successfully parsed")));
}

#[test]
fn stub_type_restrictions_recorded() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "stb",
            "<leaf name=\"a\"><type name=\"leafref\"><path value=\"../b\"/></type></leaf>\
             <leaf name=\"b\"><type name=\"decimal64\"><fraction-digits value=\"2\"/></type></leaf>\
             <leaf name=\"c\"><type name=\"string\"><length value=\"1..10\"/>\
             <pattern value=\"[a-z]*\"/></type></leaf>\
             <leaf name=\"d\"><type name=\"uint8\"><range value=\"0..99\"/></type></leaf>\
             <leaf name=\"e\"><type name=\"union\"><type name=\"string\"/>\
             <type name=\"uint8\"/></type></leaf>\
             <leaf name=\"f\"><type name=\"bits\"><bit name=\"flag\">\
             <position value=\"0\"/></bit></type></leaf>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let infos: Vec<&TypeInfo> = m
        .children(None)
        .map(|c| &m.node(c).leaf_type().unwrap().info)
        .collect();

    assert!(matches!(infos[0], TypeInfo::Leafref(Some(p)) if ctx.dict().get(*p) == "../b"));
    assert!(matches!(infos[1], TypeInfo::Dec64 { fraction_digits: 2 }));
    assert!(
        matches!(infos[2], TypeInfo::Str { length: Some(l), patterns } if ctx.dict().get(*l) == "1..10" && patterns.len() == 1)
    );
    assert!(matches!(infos[3], TypeInfo::Range(Some(r)) if ctx.dict().get(*r) == "0..99"));
    assert!(matches!(infos[4], TypeInfo::Union(members) if members.len() == 2));
    assert!(
        matches!(infos[5], TypeInfo::Bits(bits) if bits.len() == 1 && bits[0].position == Some(0))
    );
}

#[test]
fn derived_enumeration_inherits() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "denum",
            "<typedef name=\"color\"><type name=\"enumeration\">\
             <enum name=\"red\"/><enum name=\"green\"/></type></typedef>\
             <leaf name=\"l\"><type name=\"color\"/></leaf>",
        ))
        .expect("a typedef-derived enumeration needs no enums of its own");

    let m = ctx.module(id).unwrap();
    let ty = m.node(m.data.unwrap()).leaf_type().unwrap();
    assert_eq!(ty.base, TypeBase::Enumeration);
    assert!(matches!(ty.info, TypeInfo::None));
}

#[test]
fn half_ring_shape_of_compiled_module() {
    let mut ctx = Context::new();
    let id = ctx
        .parse_module(&module(
            "ring",
            "<leaf name=\"a\"><type name=\"string\"/></leaf>\
             <leaf name=\"b\"><type name=\"string\"/></leaf>\
             <leaf name=\"c\"><type name=\"string\"/></leaf>",
        ))
        .expect("compile");

    let m = ctx.module(id).unwrap();
    let nodes: Vec<_> = m.children(None).collect();
    assert_eq!(nodes.len(), 3);
    // first child's prev points at the last child; walking next from the
    // first reaches the last in N-1 steps
    assert_eq!(m.node(nodes[0]).prev, nodes[2]);
    assert_eq!(m.node(nodes[2]).next, None);
    assert_eq!(m.node(nodes[1]).prev, nodes[0]);
    assert_eq!(m.node(nodes[2]).prev, nodes[1]);
}
