//! YIN reader: the schema compiler.
//!
//! Compiles a parsed XML tree of a YIN document into a [`Module`] and
//! registers it with the context. The compiler makes three passes over the
//! children of every statement that mixes concerns, and the same shape
//! recursively inside containers, lists, and groupings:
//!
//! 1. **Classify**: assign singleton statements, count array statements,
//!    detach data-definition statements into an owned staging list.
//! 2. **Fill arrays**: imports, includes, revisions, typedefs, identities,
//!    features, with right-sized allocations; identity bases are bound after
//!    the pass so forward references within a module resolve.
//! 3. **Data nodes**: dispatch each staged statement to its kind-specific
//!    constructor.
//!
//! Any sub-step failure destroys the partially built node, propagates
//! upward, and rolls the module out of the context.

mod types;

use crate::context::Context;
use crate::diag::ValidationCode;
use crate::dict::Dict;
use crate::error::{Error, Result};
use crate::ids::{ElemId, ModuleId, NodeId, StrId, SubmoduleId};
use crate::schema::{
    Config, Feature, Module, ModuleHandle, NodeKind, NodePayload, Revision, SchemaNode, Status,
    Type, TypeBase,
};
use crate::xml::XmlDoc;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use types::{fill_type, fill_typedef, propagate_derived, resolve_base};

/// The YIN namespace; statements outside it are skipped with a warning.
pub(crate) const YIN_NS: &str = "urn:ietf:params:xml:ns:yang:yin:1";

/// YIN statement keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stmt {
    Namespace,
    Prefix,
    BelongsTo,
    YangVersion,
    Organization,
    Contact,
    Description,
    Reference,
    Status,
    Config,
    Import,
    Include,
    Revision,
    RevisionDate,
    Typedef,
    Identity,
    Feature,
    Container,
    Leaf,
    LeafList,
    List,
    Choice,
    Case,
    Uses,
    Grouping,
    AnyXml,
    Key,
    Type,
    Units,
    Default,
    Mandatory,
    Presence,
    MinElements,
    MaxElements,
    OrderedBy,
    Enum,
    Value,
    Base,
    Path,
    FractionDigits,
    Length,
    Pattern,
    Bit,
    Position,
    Refine,
    Augment,
}

impl Stmt {
    fn classify(name: &str) -> Option<Self> {
        Some(match name {
            "namespace" => Self::Namespace,
            "prefix" => Self::Prefix,
            "belongs-to" => Self::BelongsTo,
            "yang-version" => Self::YangVersion,
            "organization" => Self::Organization,
            "contact" => Self::Contact,
            "description" => Self::Description,
            "reference" => Self::Reference,
            "status" => Self::Status,
            "config" => Self::Config,
            "import" => Self::Import,
            "include" => Self::Include,
            "revision" => Self::Revision,
            "revision-date" => Self::RevisionDate,
            "typedef" => Self::Typedef,
            "identity" => Self::Identity,
            "feature" => Self::Feature,
            "container" => Self::Container,
            "leaf" => Self::Leaf,
            "leaf-list" => Self::LeafList,
            "list" => Self::List,
            "choice" => Self::Choice,
            "case" => Self::Case,
            "uses" => Self::Uses,
            "grouping" => Self::Grouping,
            "anyxml" => Self::AnyXml,
            "key" => Self::Key,
            "type" => Self::Type,
            "units" => Self::Units,
            "default" => Self::Default,
            "mandatory" => Self::Mandatory,
            "presence" => Self::Presence,
            "min-elements" => Self::MinElements,
            "max-elements" => Self::MaxElements,
            "ordered-by" => Self::OrderedBy,
            "enum" => Self::Enum,
            "value" => Self::Value,
            "base" => Self::Base,
            "path" => Self::Path,
            "fraction-digits" => Self::FractionDigits,
            "length" => Self::Length,
            "pattern" => Self::Pattern,
            "bit" => Self::Bit,
            "position" => Self::Position,
            "refine" => Self::Refine,
            "augment" => Self::Augment,
            _ => return None,
        })
    }

    /// Data-definition statements, staged in pass 1 and read in pass 3.
    fn is_data(self) -> bool {
        matches!(
            self,
            Self::Container
                | Self::Leaf
                | Self::LeafList
                | Self::List
                | Self::Choice
                | Self::Uses
                | Self::Grouping
                | Self::AnyXml
        )
    }
}

// === Small shared helpers ===

/// Value of an unqualified attribute.
pub(super) fn attr(doc: &XmlDoc, dict: &Dict, elem: ElemId, name: &str) -> Option<StrId> {
    doc.get_attr(dict, elem, name, None)
}

/// True when the element is in the YIN namespace.
fn is_yin(doc: &XmlDoc, dict: &Dict, elem: ElemId) -> bool {
    doc.elem(elem)
        .ns
        .is_some_and(|ns| dict.get(doc.ns_parts(ns).1) == YIN_NS)
}

fn elem_name(doc: &XmlDoc, dict: &Dict, elem: ElemId) -> String {
    doc.elem(elem)
        .name
        .map(|n| dict.get(n).to_string())
        .unwrap_or_default()
}

/// Report a validation error and produce the matching boundary error kind.
pub(super) fn verr(ctx: &mut Context, code: ValidationCode, line: u32, msg: String) -> Error {
    ctx.sink.error(code, Some(line), msg.clone());
    match code {
        ValidationCode::UnresolvedPrefix | ValidationCode::MissingKey => Error::Unresolved(msg),
        ValidationCode::DuplicateKey
        | ValidationCode::KeyNotLeaf
        | ValidationCode::KeyTypeEmpty
        | ValidationCode::KeyConfigMismatch
        | ValidationCode::DuplicateEnumName
        | ValidationCode::DuplicateEnumValue
        | ValidationCode::DuplicateModule
        | ValidationCode::DuplicateNodeName => Error::Conflict(msg),
        _ => Error::InvalidInput(msg),
    }
}

/// Content of the `<text>` child, the YIN encoding of description-like
/// arguments. Returns the raw content id; the caller takes its own
/// dictionary reference if it stores the value.
pub(super) fn read_text(ctx: &mut Context, doc: &XmlDoc, elem: ElemId, what: &str) -> Option<StrId> {
    let line = doc.elem(elem).line;
    let first = doc.elem(elem).child;
    let named_text = first.is_some_and(|c| {
        doc.elem(c)
            .name
            .is_some_and(|n| ctx.dict.get(n) == "text")
    });
    if !named_text {
        ctx.sink
            .warning(Some(line), format!("expected \"text\" element in \"{what}\""));
        return None;
    }
    doc.elem(first.unwrap()).content
}

/// Common statement arguments: name, description, reference, status, and
/// (for data nodes) config.
pub(super) struct CommonMeta {
    pub name: StrId,
    pub dsc: Option<StrId>,
    pub reference: Option<StrId>,
    pub status: Option<Status>,
    pub config: Option<Config>,
}

impl CommonMeta {
    /// Release held dictionary references; for error paths before the meta
    /// is moved into the node arena.
    pub(super) fn release(&self, dict: &mut Dict) {
        dict.remove(self.name);
        if let Some(dsc) = self.dsc {
            dict.remove(dsc);
        }
        if let Some(r) = self.reference {
            dict.remove(r);
        }
    }
}

/// Read the common substatements of a named statement. Consumed elements are
/// left in the tree (they are freed with their parent); dictionary
/// references are taken only on success, so error paths stay balanced.
pub(super) fn read_common(
    ctx: &mut Context,
    doc: &XmlDoc,
    elem: ElemId,
    with_config: bool,
) -> Result<CommonMeta> {
    let line = doc.elem(elem).line;
    let what = elem_name(doc, &ctx.dict, elem);

    let name = attr(doc, &ctx.dict, elem, "name");
    let name = match name {
        Some(n) if !ctx.dict.get(n).is_empty() => n,
        _ => {
            return Err(verr(
                ctx,
                ValidationCode::MissingArgument,
                line,
                format!("missing \"name\" argument in \"{what}\""),
            ))
        }
    };

    let mut dsc = None;
    let mut reference = None;
    let mut status = None;
    let mut config = None;
    let children: Vec<ElemId> = doc.children(elem).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            continue;
        };
        if !is_yin(doc, &ctx.dict, child) {
            continue;
        }
        let cline = doc.elem(child).line;
        match Stmt::classify(ctx.dict.get(cname)) {
            Some(Stmt::Description) => dsc = read_text(ctx, doc, child, "description"),
            Some(Stmt::Reference) => reference = read_text(ctx, doc, child, "reference"),
            Some(Stmt::Status) => {
                let value = attr(doc, &ctx.dict, child, "value");
                status = match value.map(|v| ctx.dict.get(v)) {
                    Some("current") => Some(Status::Current),
                    Some("deprecated") => Some(Status::Deprecated),
                    Some("obsolete") => Some(Status::Obsolete),
                    other => {
                        let msg = format!(
                            "invalid \"status\" value \"{}\"",
                            other.unwrap_or_default()
                        );
                        return Err(verr(ctx, ValidationCode::InvalidArgument, cline, msg));
                    }
                };
            }
            Some(Stmt::Config) if with_config => {
                let value = attr(doc, &ctx.dict, child, "value");
                config = match value.map(|v| ctx.dict.get(v)) {
                    Some("true") => Some(Config::Write),
                    Some("false") => Some(Config::Read),
                    other => {
                        let msg = format!(
                            "invalid \"config\" value \"{}\"",
                            other.unwrap_or_default()
                        );
                        return Err(verr(ctx, ValidationCode::InvalidArgument, cline, msg));
                    }
                };
            }
            _ => {}
        }
    }

    Ok(CommonMeta {
        name: ctx.dict.dup(name),
        dsc: dsc.map(|s| ctx.dict.dup(s)),
        reference: reference.map(|s| ctx.dict.dup(s)),
        status,
        config,
    })
}

/// Resolve inherited config/status for a new node.
fn inherited(module: &Module, parent: Option<NodeId>, meta: &CommonMeta) -> (Config, Status) {
    let config = meta.config.unwrap_or_else(|| {
        parent
            .map(|p| module.node(p).config)
            .unwrap_or_default()
    });
    let status = meta.status.unwrap_or_else(|| {
        parent
            .map(|p| module.node(p).status)
            .unwrap_or_default()
    });
    (config, status)
}

/// True when any ancestor (including `parent` itself) is a grouping; a
/// `uses` in that position keeps its reference unresolved until the
/// grouping is instantiated.
fn inside_grouping(module: &Module, parent: Option<NodeId>) -> bool {
    let mut cur = parent;
    while let Some(id) = cur {
        if module.node(id).kind() == NodeKind::Grouping {
            return true;
        }
        cur = module.node(id).parent;
    }
    false
}

/// Link a finished node under its parent, rejecting duplicate sibling names.
fn attach(ctx: &mut Context, module: &mut Module, parent: Option<NodeId>, id: NodeId, line: u32) -> Result<()> {
    let name = module.node(id).name;
    if module.find_child(parent, name, &[]).is_some() {
        let msg = format!(
            "duplicate node name \"{}\" among siblings",
            ctx.dict.get(name)
        );
        return Err(verr(ctx, ValidationCode::DuplicateNodeName, line, msg));
    }
    module.add_child(parent, id);
    Ok(())
}

fn parse_max_elements(ctx: &mut Context, line: u32, value: &str) -> Result<Option<u32>> {
    if value == "unbounded" {
        return Ok(None);
    }
    match value.parse::<u32>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(verr(
            ctx,
            ValidationCode::InvalidArgument,
            line,
            format!("invalid \"max-elements\" value \"{value}\""),
        )),
    }
}

fn parse_bool(ctx: &mut Context, line: u32, what: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(verr(
            ctx,
            ValidationCode::InvalidArgument,
            line,
            format!("invalid \"{what}\" value \"{value}\""),
        )),
    }
}

// === Module entry points ===

/// Compile a module from YIN text and register it.
pub(crate) fn read_module(ctx: &mut Context, data: &str, implemented: bool) -> Result<ModuleId> {
    let Some(mut doc) = XmlDoc::parse(data, &mut ctx.dict, &mut ctx.sink) else {
        return Err(Error::InvalidInput("malformed XML document".into()));
    };
    let root = doc.root().expect("parsed document has a root");
    let line = doc.elem(root).line;

    let root_name = elem_name(&doc, &ctx.dict, root);
    if root_name != "module" {
        let err = verr(
            ctx,
            ValidationCode::UnknownStatement,
            line,
            format!("expected \"module\" element, found \"{root_name}\""),
        );
        doc.free_elem(&mut ctx.dict, root);
        return Err(err);
    }
    let Some(name_attr) = attr(&doc, &ctx.dict, root, "name") else {
        let err = verr(
            ctx,
            ValidationCode::MissingArgument,
            line,
            "missing \"name\" argument in \"module\"".into(),
        );
        doc.free_elem(&mut ctx.dict, root);
        return Err(err);
    };
    let name_string = ctx.dict.get(name_attr).to_string();

    let idx = ctx.modules.len();
    let Some(id) = ModuleId::from_index(idx) else {
        doc.free_elem(&mut ctx.dict, root);
        return Err(Error::Capacity("modules"));
    };
    ctx.modules.push(None);
    let handle = ModuleHandle::Module(id);

    let name = ctx.dict.dup(name_attr);
    let mut module = Module::new(handle, name);
    module.implemented = implemented;

    ctx.sink.verbose(format!("reading module {name_string}"));
    ctx.loading.push(name_string.clone());
    let result = read_sub_module(ctx, &mut module, &mut doc, root, None);
    ctx.loading.pop();

    if doc.is_live(root) {
        doc.free_elem(&mut ctx.dict, root);
    }

    let result = result.and_then(|()| ctx.check_duplicate(&module));
    match result {
        Ok(()) => {
            ctx.modules[idx] = Some(module);
            ctx.bump_module_set();
            ctx.sink
                .verbose(format!("module {name_string} successfully parsed"));
            Ok(id)
        }
        Err(err) => {
            ctx.purge_derived(handle);
            module.release(&mut ctx.dict);
            Err(err)
        }
    }
}

/// Compile a submodule from YIN text and register it.
///
/// `parent_name` is the name of the module the submodule must belong to
/// (the owning module may itself still be mid-compilation).
pub(crate) fn read_submodule(
    ctx: &mut Context,
    belongs_to: ModuleId,
    parent_name: &str,
    data: &str,
) -> Result<SubmoduleId> {
    let Some(mut doc) = XmlDoc::parse(data, &mut ctx.dict, &mut ctx.sink) else {
        return Err(Error::InvalidInput("malformed XML document".into()));
    };
    let root = doc.root().expect("parsed document has a root");
    let line = doc.elem(root).line;

    let root_name = elem_name(&doc, &ctx.dict, root);
    if root_name != "submodule" {
        let err = verr(
            ctx,
            ValidationCode::UnknownStatement,
            line,
            format!("expected \"submodule\" element, found \"{root_name}\""),
        );
        doc.free_elem(&mut ctx.dict, root);
        return Err(err);
    }
    let Some(name_attr) = attr(&doc, &ctx.dict, root, "name") else {
        let err = verr(
            ctx,
            ValidationCode::MissingArgument,
            line,
            "missing \"name\" argument in \"submodule\"".into(),
        );
        doc.free_elem(&mut ctx.dict, root);
        return Err(err);
    };
    let name_string = ctx.dict.get(name_attr).to_string();

    let idx = ctx.submodules.len();
    let Some(id) = SubmoduleId::from_index(idx) else {
        doc.free_elem(&mut ctx.dict, root);
        return Err(Error::Capacity("submodules"));
    };
    ctx.submodules.push(None);
    let handle = ModuleHandle::Submodule(id);

    let name = ctx.dict.dup(name_attr);
    let mut module = Module::new(handle, name);
    module.belongs_to = Some(belongs_to);

    ctx.sink.verbose(format!("reading submodule {name_string}"));
    ctx.loading.push(name_string.clone());
    let result = read_sub_module(ctx, &mut module, &mut doc, root, Some(parent_name));
    ctx.loading.pop();

    if doc.is_live(root) {
        doc.free_elem(&mut ctx.dict, root);
    }

    match result {
        Ok(()) => {
            ctx.submodules[idx] = Some(module);
            ctx.sink
                .verbose(format!("submodule {name_string} successfully parsed"));
            Ok(id)
        }
        Err(err) => {
            ctx.purge_derived(handle);
            module.release(&mut ctx.dict);
            Err(err)
        }
    }
}

/// Shared body of module and submodule compilation: the three passes over
/// the root's children.
fn read_sub_module(
    ctx: &mut Context,
    module: &mut Module,
    doc: &mut XmlDoc,
    yin: ElemId,
    parent_name: Option<&str>,
) -> Result<()> {
    let mut staging: Vec<ElemId> = Vec::new();
    let result = read_sub_module_inner(ctx, module, doc, yin, parent_name, &mut staging);
    if result.is_err() {
        for &elem in &staging {
            if doc.is_live(elem) {
                doc.free_elem(&mut ctx.dict, elem);
            }
        }
    }
    result
}

#[allow(clippy::too_many_lines)]
fn read_sub_module_inner(
    ctx: &mut Context,
    module: &mut Module,
    doc: &mut XmlDoc,
    yin: ElemId,
    parent_name: Option<&str>,
    staging: &mut Vec<ElemId>,
) -> Result<()> {
    let submodule = parent_name.is_some();
    let line = doc.elem(yin).line;

    // pass 1: singletons, counts, staging
    let mut c_imp = 0usize;
    let mut c_inc = 0usize;
    let mut c_rev = 0usize;
    let mut c_tpdf = 0usize;
    let mut c_ident = 0usize;
    let mut c_feat = 0usize;

    let children: Vec<ElemId> = doc.children(yin).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            doc.free_elem(&mut ctx.dict, child);
            continue;
        };
        if !is_yin(doc, &ctx.dict, child) {
            let cline = doc.elem(child).line;
            let msg = format!(
                "skipping \"{}\" in foreign namespace",
                ctx.dict.get(cname)
            );
            ctx.sink.warning(Some(cline), msg);
            doc.free_elem(&mut ctx.dict, child);
            continue;
        }
        let cline = doc.elem(child).line;
        let stmt = Stmt::classify(ctx.dict.get(cname));
        match stmt {
            Some(Stmt::Namespace) if !submodule => {
                if module.namespace.is_some() {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"namespace\" appears more than once in \"module\"".into(),
                    ));
                }
                let Some(uri) = attr(doc, &ctx.dict, child, "uri") else {
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"uri\" argument in \"namespace\"".into(),
                    ));
                };
                module.namespace = Some(ctx.dict.dup(uri));
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Prefix) if !submodule => {
                if module.prefix.is_some() {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"prefix\" appears more than once in \"module\"".into(),
                    ));
                }
                let Some(value) = attr(doc, &ctx.dict, child, "value") else {
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"value\" argument in \"prefix\"".into(),
                    ));
                };
                module.prefix = Some(ctx.dict.dup(value));
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::BelongsTo) if submodule => {
                let target = attr(doc, &ctx.dict, child, "module");
                let expected = parent_name.unwrap_or_default();
                if target.map(|t| ctx.dict.get(t)) != Some(expected) {
                    return Err(verr(
                        ctx,
                        ValidationCode::InvalidArgument,
                        cline,
                        format!("submodule does not belong to \"{expected}\""),
                    ));
                }
                // the submodule refers to its module through this prefix
                if let Some(prefix_elem) = doc.child_by_name(
                    child,
                    match ctx.dict.find("prefix") {
                        Some(p) => p,
                        None => {
                            doc.free_elem(&mut ctx.dict, child);
                            continue;
                        }
                    },
                ) {
                    if let Some(value) = attr(doc, &ctx.dict, prefix_elem, "value") {
                        module.prefix = Some(ctx.dict.dup(value));
                    }
                }
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Import) => c_imp += 1,
            Some(Stmt::Include) => c_inc += 1,
            Some(Stmt::Revision) => c_rev += 1,
            Some(Stmt::Typedef) => c_tpdf += 1,
            Some(Stmt::Identity) => c_ident += 1,
            Some(Stmt::Feature) => c_feat += 1,
            Some(s) if s.is_data() => {
                doc.unlink(child);
                staging.push(child);
            }
            Some(Stmt::Description) => {
                if module.dsc.is_some() {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"description\" appears more than once".into(),
                    ));
                }
                module.dsc = read_text(ctx, doc, child, "description").map(|s| ctx.dict.dup(s));
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Reference) => {
                if module.reference.is_some() {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"reference\" appears more than once".into(),
                    ));
                }
                module.reference = read_text(ctx, doc, child, "reference").map(|s| ctx.dict.dup(s));
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Organization) => {
                if module.organization.is_some() {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"organization\" appears more than once".into(),
                    ));
                }
                module.organization =
                    read_text(ctx, doc, child, "organization").map(|s| ctx.dict.dup(s));
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Contact) => {
                if module.contact.is_some() {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"contact\" appears more than once".into(),
                    ));
                }
                module.contact = read_text(ctx, doc, child, "contact").map(|s| ctx.dict.dup(s));
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::YangVersion) => {
                if module.version != 0 {
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"yang-version\" appears more than once".into(),
                    ));
                }
                let value = attr(doc, &ctx.dict, child, "value");
                if value.map(|v| ctx.dict.get(v)) != Some("1") {
                    return Err(verr(
                        ctx,
                        ValidationCode::InvalidArgument,
                        cline,
                        "unsupported \"yang-version\"".into(),
                    ));
                }
                module.version = 1;
                doc.free_elem(&mut ctx.dict, child);
            }
            _ => {
                let msg = format!("unsupported statement \"{}\" ignored", ctx.dict.get(cname));
                ctx.sink.warning(Some(cline), msg);
                doc.free_elem(&mut ctx.dict, child);
            }
        }
    }

    if !submodule {
        if module.namespace.is_none() {
            return Err(verr(
                ctx,
                ValidationCode::MissingStatement,
                line,
                "missing \"namespace\" statement in \"module\"".into(),
            ));
        }
        if module.prefix.is_none() {
            return Err(verr(
                ctx,
                ValidationCode::MissingStatement,
                line,
                "missing \"prefix\" statement in \"module\"".into(),
            ));
        }
    }

    // pass 2: right-sized arrays in source order
    module.imports.reserve_exact(c_imp);
    module.includes.reserve_exact(c_inc);
    module.revisions.reserve_exact(c_rev);
    module.typedefs.reserve_exact(c_tpdf);
    module.identities.reserve_exact(c_ident);
    module.features.reserve_exact(c_feat);

    // identity bases bind after the pass: forward references within the
    // module are legal
    let mut pending_bases: Vec<(usize, String, u32)> = Vec::new();

    let children: Vec<ElemId> = doc.children(yin).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            doc.free_elem(&mut ctx.dict, child);
            continue;
        };
        let cline = doc.elem(child).line;
        match Stmt::classify(ctx.dict.get(cname)) {
            Some(Stmt::Import) => {
                let imp = fill_import(ctx, module, doc, child)?;
                module.imports.push(imp);
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Include) => {
                let inc = fill_include(ctx, module, doc, child, parent_name)?;
                module.includes.push(inc);
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Revision) => {
                let Some(date) = attr(doc, &ctx.dict, child, "date") else {
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"date\" argument in \"revision\"".into(),
                    ));
                };
                let mut dsc = None;
                let mut reference = None;
                let grandchildren: Vec<ElemId> = doc.children(child).collect();
                for sub in grandchildren {
                    let Some(sname) = doc.elem(sub).name else {
                        continue;
                    };
                    match Stmt::classify(ctx.dict.get(sname)) {
                        Some(Stmt::Description) => {
                            dsc = read_text(ctx, doc, sub, "description");
                        }
                        Some(Stmt::Reference) => {
                            reference = read_text(ctx, doc, sub, "reference");
                        }
                        _ => {}
                    }
                }
                let revision = Revision {
                    date: ctx.dict.dup(date),
                    dsc: dsc.map(|s| ctx.dict.dup(s)),
                    reference: reference.map(|s| ctx.dict.dup(s)),
                };
                module.revisions.push(revision);
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Typedef) => {
                let tpdf = fill_typedef(ctx, module, None, doc, child)?;
                module.typedefs.push(tpdf);
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Identity) => {
                let index = module.identities.len();
                let ident = fill_identity(ctx, doc, child, index, &mut pending_bases)?;
                module.identities.push(ident);
                doc.free_elem(&mut ctx.dict, child);
            }
            Some(Stmt::Feature) => {
                let meta = read_common(ctx, doc, child, false)?;
                module.features.push(Feature {
                    name: meta.name,
                    dsc: meta.dsc,
                    reference: meta.reference,
                    status: meta.status.unwrap_or_default(),
                    enabled: false,
                });
                doc.free_elem(&mut ctx.dict, child);
            }
            _ => {
                doc.free_elem(&mut ctx.dict, child);
            }
        }
    }

    for (index, base_arg, bline) in &pending_bases {
        resolve_base(ctx, module, Some(*index), base_arg, *bline)?;
    }
    for (index, _, bline) in &pending_bases {
        if module.identities[*index].base.is_some() {
            propagate_derived(ctx, module, *index, *bline)?;
        }
    }

    // pass 3: data nodes
    for i in 0..staging.len() {
        let elem = staging[i];
        let result = read_data_node(ctx, module, None, doc, elem);
        doc.free_elem(&mut ctx.dict, elem);
        if let Err(err) = result {
            for &rest in &staging[i + 1..] {
                doc.free_elem(&mut ctx.dict, rest);
            }
            staging.clear();
            return Err(err);
        }
    }
    staging.clear();

    Ok(())
}

/// Read an `identity` statement; the `base` argument is recorded for
/// post-pass binding.
fn fill_identity(
    ctx: &mut Context,
    doc: &XmlDoc,
    elem: ElemId,
    index: usize,
    pending: &mut Vec<(usize, String, u32)>,
) -> Result<crate::schema::Identity> {
    let meta = read_common(ctx, doc, elem, false)?;
    let mut base_seen = false;

    let children: Vec<ElemId> = doc.children(elem).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            continue;
        };
        if !is_yin(doc, &ctx.dict, child) {
            continue;
        }
        let cline = doc.elem(child).line;
        match Stmt::classify(ctx.dict.get(cname)) {
            Some(Stmt::Base) => {
                if base_seen {
                    meta.release(&mut ctx.dict);
                    return Err(verr(
                        ctx,
                        ValidationCode::TooManyStatements,
                        cline,
                        "\"base\" appears more than once in \"identity\"".into(),
                    ));
                }
                base_seen = true;
                let Some(arg) = attr(doc, &ctx.dict, child, "name") else {
                    meta.release(&mut ctx.dict);
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"name\" argument in \"base\"".into(),
                    ));
                };
                pending.push((index, ctx.dict.get(arg).to_string(), cline));
            }
            Some(Stmt::Description | Stmt::Reference | Stmt::Status) => {}
            _ => {
                let msg = format!(
                    "invalid statement \"{}\" in \"identity\"",
                    ctx.dict.get(cname)
                );
                meta.release(&mut ctx.dict);
                return Err(verr(ctx, ValidationCode::UnknownStatement, cline, msg));
            }
        }
    }

    let mut ident = crate::schema::Identity::new(meta.name);
    ident.dsc = meta.dsc;
    ident.reference = meta.reference;
    ident.status = meta.status.unwrap_or_default();
    Ok(ident)
}

/// Read an `import`: resolve the prefix and the target module, loading it
/// through the context when it is not registered yet.
fn fill_import(
    ctx: &mut Context,
    module: &Module,
    doc: &XmlDoc,
    elem: ElemId,
) -> Result<crate::schema::Import> {
    let line = doc.elem(elem).line;
    let mut prefix: Option<StrId> = None;
    let mut revision: Option<StrId> = None;

    let children: Vec<ElemId> = doc.children(elem).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            continue;
        };
        if !is_yin(doc, &ctx.dict, child) {
            continue;
        }
        let cline = doc.elem(child).line;
        match Stmt::classify(ctx.dict.get(cname)) {
            Some(Stmt::Prefix) => {
                prefix = attr(doc, &ctx.dict, child, "value");
            }
            Some(Stmt::RevisionDate) => {
                let Some(date) = attr(doc, &ctx.dict, child, "date") else {
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"date\" argument in \"revision-date\"".into(),
                    ));
                };
                revision = Some(date);
            }
            _ => {
                let msg = format!(
                    "invalid statement \"{}\" in \"import\"",
                    ctx.dict.get(cname)
                );
                return Err(verr(ctx, ValidationCode::UnknownStatement, cline, msg));
            }
        }
    }

    let Some(target_name) = attr(doc, &ctx.dict, elem, "module") else {
        return Err(verr(
            ctx,
            ValidationCode::MissingArgument,
            line,
            "missing \"module\" argument in \"import\"".into(),
        ));
    };
    let Some(prefix) = prefix else {
        return Err(verr(
            ctx,
            ValidationCode::MissingStatement,
            line,
            "missing \"prefix\" statement in \"import\"".into(),
        ));
    };

    let target_name = ctx.dict.get(target_name).to_string();
    let revision_str = revision.map(|r| ctx.dict.get(r).to_string());
    let target = match ctx.get_or_load_module(&target_name, revision_str.as_deref()) {
        Ok(id) => id,
        Err(err) => {
            let msg = format!(
                "importing \"{}\" module into \"{}\" failed",
                target_name,
                ctx.dict.get(module.name)
            );
            ctx.sink.error(ValidationCode::UnresolvedPrefix, Some(line), msg);
            return Err(err);
        }
    };

    Ok(crate::schema::Import {
        prefix: ctx.dict.dup(prefix),
        revision: revision.map(|r| ctx.dict.dup(r)),
        module: target,
    })
}

/// Read an `include`: resolve the submodule, loading it when needed.
fn fill_include(
    ctx: &mut Context,
    module: &Module,
    doc: &XmlDoc,
    elem: ElemId,
    parent_name: Option<&str>,
) -> Result<crate::schema::Include> {
    let line = doc.elem(elem).line;
    let mut revision: Option<StrId> = None;

    let children: Vec<ElemId> = doc.children(elem).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            continue;
        };
        if !is_yin(doc, &ctx.dict, child) {
            continue;
        }
        let cline = doc.elem(child).line;
        match Stmt::classify(ctx.dict.get(cname)) {
            Some(Stmt::RevisionDate) => {
                let Some(date) = attr(doc, &ctx.dict, child, "date") else {
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"date\" argument in \"revision-date\"".into(),
                    ));
                };
                revision = Some(date);
            }
            _ => {
                let msg = format!(
                    "invalid statement \"{}\" in \"include\"",
                    ctx.dict.get(cname)
                );
                return Err(verr(ctx, ValidationCode::UnknownStatement, cline, msg));
            }
        }
    }

    let Some(target_name) = attr(doc, &ctx.dict, elem, "module") else {
        return Err(verr(
            ctx,
            ValidationCode::MissingArgument,
            line,
            "missing \"module\" argument in \"include\"".into(),
        ));
    };

    // a submodule's includes belong to its owning module
    let owner = match module.handle {
        ModuleHandle::Module(id) => id,
        ModuleHandle::Submodule(_) => module.belongs_to.expect("submodule has belongs-to"),
    };
    let owner_name = match parent_name {
        Some(n) => n.to_string(),
        None => ctx.dict.get(module.name).to_string(),
    };
    let target_name = ctx.dict.get(target_name).to_string();
    let revision_str = revision.map(|r| ctx.dict.get(r).to_string());

    let submodule = match ctx.get_or_load_submodule(
        owner,
        &owner_name,
        &target_name,
        revision_str.as_deref(),
    ) {
        Ok(id) => id,
        Err(err) => {
            let msg = format!(
                "including \"{}\" submodule into \"{}\" failed",
                target_name,
                ctx.dict.get(module.name)
            );
            ctx.sink.error(ValidationCode::UnresolvedPrefix, Some(line), msg);
            return Err(err);
        }
    };

    Ok(crate::schema::Include {
        revision: revision.map(|r| ctx.dict.dup(r)),
        submodule,
    })
}

// === Data node constructors ===

/// Dispatch a data-definition statement to its constructor.
fn read_data_node(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let name = elem_name(doc, &ctx.dict, elem);
    match Stmt::classify(&name) {
        Some(Stmt::Container) => read_container(ctx, module, parent, doc, elem),
        Some(Stmt::Leaf) => read_leaf(ctx, module, parent, doc, elem),
        Some(Stmt::LeafList) => read_leaflist(ctx, module, parent, doc, elem),
        Some(Stmt::List) => read_list(ctx, module, parent, doc, elem),
        Some(Stmt::Choice) => read_choice(ctx, module, parent, doc, elem),
        Some(Stmt::Case) => read_case(ctx, module, parent, doc, elem),
        Some(Stmt::Uses) => read_uses(ctx, module, parent, doc, elem),
        Some(Stmt::Grouping) => read_grouping(ctx, module, parent, doc, elem),
        Some(Stmt::AnyXml) => read_anyxml(ctx, module, parent, doc, elem),
        _ => Err(verr(
            ctx,
            ValidationCode::UnknownStatement,
            line,
            format!("unexpected statement \"{name}\""),
        )),
    }
}

/// Allocate a node shell from common metadata; the caller fills the payload
/// and attaches it.
fn alloc_shell(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    meta: CommonMeta,
    payload: NodePayload,
) -> Result<NodeId> {
    let (config, status) = inherited(module, parent, &meta);
    let node = SchemaNode {
        parent,
        child: None,
        next: None,
        prev: NodeId::from_raw(1).expect("nonzero"),
        module: module.handle,
        name: meta.name,
        dsc: meta.dsc,
        reference: meta.reference,
        status,
        config,
        mandatory: false,
        ordered_by_user: false,
        payload,
    };
    match module.alloc_node(node) {
        Ok(id) => Ok(id),
        Err(err) => {
            ctx.sink.warning(None, "schema node arena exhausted".into());
            Err(err)
        }
    }
}

fn read_leaf(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(
        ctx,
        module,
        parent,
        meta,
        NodePayload::Leaf {
            ty: Type::builtin(TypeBase::Empty),
            units: None,
            default: None,
        },
    )?;

    let body = (|| -> Result<()> {
        let mut has_type = false;
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            let cline = doc.elem(child).line;
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(Stmt::Type) => {
                    if has_type {
                        return Err(verr(
                            ctx,
                            ValidationCode::TooManyStatements,
                            cline,
                            "\"type\" appears more than once in \"leaf\"".into(),
                        ));
                    }
                    has_type = true;
                    let ty = fill_type(ctx, module, parent, doc, child)?;
                    let NodePayload::Leaf { ty: slot, .. } = &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *slot = ty;
                }
                Some(Stmt::Units) => {
                    if let Some(units) = attr(doc, &ctx.dict, child, "name") {
                        let units = ctx.dict.dup(units);
                        let NodePayload::Leaf { units: slot, .. } =
                            &mut module.node_mut(id).payload
                        else {
                            unreachable!()
                        };
                        *slot = Some(units);
                    }
                }
                Some(Stmt::Default) => {
                    if let Some(value) = attr(doc, &ctx.dict, child, "value") {
                        let value = ctx.dict.dup(value);
                        let NodePayload::Leaf { default: slot, .. } =
                            &mut module.node_mut(id).payload
                        else {
                            unreachable!()
                        };
                        *slot = Some(value);
                    }
                }
                Some(Stmt::Mandatory) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    module.node_mut(id).mandatory = parse_bool(ctx, cline, "mandatory", &value)?;
                }
                _ => {}
            }
        }
        if !has_type {
            return Err(verr(
                ctx,
                ValidationCode::MissingStatement,
                line,
                "missing \"type\" statement in \"leaf\"".into(),
            ));
        }
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

fn read_leaflist(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(
        ctx,
        module,
        parent,
        meta,
        NodePayload::LeafList {
            ty: Type::builtin(TypeBase::Empty),
            units: None,
            min_elements: 0,
            max_elements: None,
        },
    )?;

    let body = (|| -> Result<()> {
        let mut has_type = false;
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            let cline = doc.elem(child).line;
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(Stmt::Type) => {
                    if has_type {
                        return Err(verr(
                            ctx,
                            ValidationCode::TooManyStatements,
                            cline,
                            "\"type\" appears more than once in \"leaf-list\"".into(),
                        ));
                    }
                    has_type = true;
                    let ty = fill_type(ctx, module, parent, doc, child)?;
                    let NodePayload::LeafList { ty: slot, .. } = &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *slot = ty;
                }
                Some(Stmt::Units) => {
                    if let Some(units) = attr(doc, &ctx.dict, child, "name") {
                        let units = ctx.dict.dup(units);
                        let NodePayload::LeafList { units: slot, .. } =
                            &mut module.node_mut(id).payload
                        else {
                            unreachable!()
                        };
                        *slot = Some(units);
                    }
                }
                Some(Stmt::MinElements) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    let min = value.parse::<u32>().map_err(|_| {
                        verr(
                            ctx,
                            ValidationCode::InvalidArgument,
                            cline,
                            format!("invalid \"min-elements\" value \"{value}\""),
                        )
                    })?;
                    let NodePayload::LeafList { min_elements, .. } =
                        &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *min_elements = min;
                }
                Some(Stmt::MaxElements) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    let max = parse_max_elements(ctx, cline, &value)?;
                    let NodePayload::LeafList { max_elements, .. } =
                        &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *max_elements = max;
                }
                Some(Stmt::OrderedBy) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    module.node_mut(id).ordered_by_user = match value.as_str() {
                        "user" => true,
                        "system" => false,
                        _ => {
                            return Err(verr(
                                ctx,
                                ValidationCode::InvalidArgument,
                                cline,
                                format!("invalid \"ordered-by\" value \"{value}\""),
                            ))
                        }
                    };
                }
                _ => {}
            }
        }
        if !has_type {
            return Err(verr(
                ctx,
                ValidationCode::MissingStatement,
                line,
                "missing \"type\" statement in \"leaf-list\"".into(),
            ));
        }
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

fn read_anyxml(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(ctx, module, parent, meta, NodePayload::AnyXml)?;

    let body = (|| -> Result<()> {
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            let cline = doc.elem(child).line;
            if Stmt::classify(ctx.dict.get(cname)) == Some(Stmt::Mandatory) {
                let value = attr(doc, &ctx.dict, child, "value")
                    .map(|v| ctx.dict.get(v).to_string())
                    .unwrap_or_default();
                module.node_mut(id).mandatory = parse_bool(ctx, cline, "mandatory", &value)?;
            }
        }
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

/// Shared three-pass body for container, list, and grouping: stage data
/// statements, fill the typedef table, then read the staged children.
fn read_scoped_children(
    ctx: &mut Context,
    module: &mut Module,
    id: NodeId,
    doc: &mut XmlDoc,
    staging: &[ElemId],
    typedef_elems: &[ElemId],
) -> Result<()> {
    for &child in typedef_elems {
        let tpdf = fill_typedef(ctx, module, Some(id), doc, child)?;
        match &mut module.node_mut(id).payload {
            NodePayload::Container { typedefs, .. }
            | NodePayload::List { typedefs, .. }
            | NodePayload::Grouping { typedefs } => typedefs.push(tpdf),
            _ => unreachable!(),
        }
    }

    for i in 0..staging.len() {
        let elem = staging[i];
        let result = read_data_node(ctx, module, Some(id), doc, elem);
        doc.free_elem(&mut ctx.dict, elem);
        if let Err(err) = result {
            for &rest in &staging[i + 1..] {
                doc.free_elem(&mut ctx.dict, rest);
            }
            return Err(err);
        }
    }
    Ok(())
}

fn read_container(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(
        ctx,
        module,
        parent,
        meta,
        NodePayload::Container {
            presence: false,
            typedefs: Vec::new(),
        },
    )?;

    let mut staging: Vec<ElemId> = Vec::new();
    let body = (|| -> Result<()> {
        let mut typedef_elems: Vec<ElemId> = Vec::new();
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(s) if s.is_data() => {
                    doc.unlink(child);
                    staging.push(child);
                }
                Some(Stmt::Typedef) => typedef_elems.push(child),
                Some(Stmt::Presence) => {
                    let NodePayload::Container { presence, .. } = &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *presence = true;
                }
                _ => {}
            }
        }

        read_scoped_children(ctx, module, id, doc, &staging, &typedef_elems)?;
        staging.clear();
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            for &rest in &staging {
                if doc.is_live(rest) {
                    doc.free_elem(&mut ctx.dict, rest);
                }
            }
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

fn read_grouping(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, false)?;
    let id = alloc_shell(
        ctx,
        module,
        parent,
        meta,
        NodePayload::Grouping {
            typedefs: Vec::new(),
        },
    )?;

    let mut staging: Vec<ElemId> = Vec::new();
    let body = (|| -> Result<()> {
        let mut typedef_elems: Vec<ElemId> = Vec::new();
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(s) if s.is_data() => {
                    doc.unlink(child);
                    staging.push(child);
                }
                Some(Stmt::Typedef) => typedef_elems.push(child),
                _ => {}
            }
        }

        read_scoped_children(ctx, module, id, doc, &staging, &typedef_elems)?;
        staging.clear();
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            for &rest in &staging {
                if doc.is_live(rest) {
                    doc.free_elem(&mut ctx.dict, rest);
                }
            }
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

#[allow(clippy::too_many_lines)]
fn read_list(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(
        ctx,
        module,
        parent,
        meta,
        NodePayload::List {
            typedefs: Vec::new(),
            keys: Vec::new(),
            min_elements: 0,
            max_elements: None,
        },
    )?;

    let mut staging: Vec<ElemId> = Vec::new();
    let body = (|| -> Result<()> {
        let mut typedef_elems: Vec<ElemId> = Vec::new();
        let mut key_str: Option<String> = None;
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            let cline = doc.elem(child).line;
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(s) if s.is_data() => {
                    doc.unlink(child);
                    staging.push(child);
                }
                Some(Stmt::Typedef) => typedef_elems.push(child),
                Some(Stmt::Key) => {
                    if key_str.is_some() {
                        return Err(verr(
                            ctx,
                            ValidationCode::TooManyStatements,
                            cline,
                            "\"key\" appears more than once in \"list\"".into(),
                        ));
                    }
                    let Some(value) = attr(doc, &ctx.dict, child, "value") else {
                        return Err(verr(
                            ctx,
                            ValidationCode::MissingArgument,
                            cline,
                            "missing \"value\" argument in \"key\"".into(),
                        ));
                    };
                    key_str = Some(ctx.dict.get(value).to_string());
                }
                Some(Stmt::MinElements) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    let min = value.parse::<u32>().map_err(|_| {
                        verr(
                            ctx,
                            ValidationCode::InvalidArgument,
                            cline,
                            format!("invalid \"min-elements\" value \"{value}\""),
                        )
                    })?;
                    let NodePayload::List { min_elements, .. } = &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *min_elements = min;
                }
                Some(Stmt::MaxElements) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    let max = parse_max_elements(ctx, cline, &value)?;
                    let NodePayload::List { max_elements, .. } = &mut module.node_mut(id).payload
                    else {
                        unreachable!()
                    };
                    *max_elements = max;
                }
                Some(Stmt::OrderedBy) => {
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    module.node_mut(id).ordered_by_user = match value.as_str() {
                        "user" => true,
                        "system" => false,
                        _ => {
                            return Err(verr(
                                ctx,
                                ValidationCode::InvalidArgument,
                                cline,
                                format!("invalid \"ordered-by\" value \"{value}\""),
                            ))
                        }
                    };
                }
                _ => {}
            }
        }

        // a configuration list must declare keys
        if module.node(id).config == Config::Write && key_str.is_none() {
            return Err(verr(
                ctx,
                ValidationCode::MissingStatement,
                line,
                "missing \"key\" statement in configuration \"list\"".into(),
            ));
        }

        read_scoped_children(ctx, module, id, doc, &staging, &typedef_elems)?;
        staging.clear();

        // bind key leaves and check the key constraints
        if let Some(key_str) = key_str {
            let list_name = ctx.dict.get(module.node(id).name).to_string();
            let list_config = module.node(id).config;
            let mut keys: Vec<NodeId> = Vec::new();
            for token in key_str.split_whitespace() {
                let key_id = ctx
                    .dict
                    .find(token)
                    .and_then(|tok| module.find_child(Some(id), tok, &[]));
                let Some(key_id) = key_id else {
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingKey,
                        line,
                        format!("key \"{token}\" is not a child of list \"{list_name}\""),
                    ));
                };
                if keys.contains(&key_id) {
                    return Err(verr(
                        ctx,
                        ValidationCode::DuplicateKey,
                        line,
                        format!("duplicated key \"{token}\" in list \"{list_name}\""),
                    ));
                }
                let key = module.node(key_id);
                if key.kind() != NodeKind::Leaf {
                    return Err(verr(
                        ctx,
                        ValidationCode::KeyNotLeaf,
                        line,
                        format!("key \"{token}\" of list \"{list_name}\" is not a leaf"),
                    ));
                }
                if key.leaf_type().map(|t| t.base) == Some(TypeBase::Empty) {
                    return Err(verr(
                        ctx,
                        ValidationCode::KeyTypeEmpty,
                        line,
                        format!("key \"{token}\" of list \"{list_name}\" has type \"empty\""),
                    ));
                }
                if key.config != list_config {
                    return Err(verr(
                        ctx,
                        ValidationCode::KeyConfigMismatch,
                        line,
                        format!(
                            "config of key \"{token}\" differs from list \"{list_name}\""
                        ),
                    ));
                }
                keys.push(key_id);
            }
            let NodePayload::List { keys: slot, .. } = &mut module.node_mut(id).payload else {
                unreachable!()
            };
            *slot = keys;
        }

        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            for &rest in &staging {
                if doc.is_live(rest) {
                    doc.free_elem(&mut ctx.dict, rest);
                }
            }
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

fn read_choice(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(ctx, module, parent, meta, NodePayload::Choice { default: None })?;

    let body = (|| -> Result<()> {
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(
                    Stmt::Container
                    | Stmt::Leaf
                    | Stmt::LeafList
                    | Stmt::List
                    | Stmt::Case
                    | Stmt::AnyXml,
                ) => {
                    read_data_node(ctx, module, Some(id), doc, child)?;
                }
                Some(Stmt::Default) => {
                    if let Some(value) = attr(doc, &ctx.dict, child, "value") {
                        let value = ctx.dict.dup(value);
                        let NodePayload::Choice { default } = &mut module.node_mut(id).payload
                        else {
                            unreachable!()
                        };
                        *default = Some(value);
                    }
                }
                Some(Stmt::Mandatory) => {
                    let cline = doc.elem(child).line;
                    let value = attr(doc, &ctx.dict, child, "value")
                        .map(|v| ctx.dict.get(v).to_string())
                        .unwrap_or_default();
                    module.node_mut(id).mandatory = parse_bool(ctx, cline, "mandatory", &value)?;
                }
                _ => {}
            }
        }
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

fn read_case(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, true)?;
    let id = alloc_shell(ctx, module, parent, meta, NodePayload::Case)?;

    let body = (|| -> Result<()> {
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(
                    Stmt::Container
                    | Stmt::Leaf
                    | Stmt::LeafList
                    | Stmt::List
                    | Stmt::Choice
                    | Stmt::Uses
                    | Stmt::AnyXml,
                ) => {
                    read_data_node(ctx, module, Some(id), doc, child)?;
                }
                _ => {}
            }
        }
        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}

fn read_uses(
    ctx: &mut Context,
    module: &mut Module,
    parent: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<NodeId> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, false)?;
    let id = alloc_shell(
        ctx,
        module,
        parent,
        meta,
        NodePayload::Uses {
            grouping: None,
            refines: Vec::new(),
            augments: Vec::new(),
        },
    )?;

    let body = (|| -> Result<()> {
        let children: Vec<ElemId> = doc.children(elem).collect();
        for child in children {
            let Some(cname) = doc.elem(child).name else {
                continue;
            };
            if !is_yin(doc, &ctx.dict, child) {
                continue;
            }
            match Stmt::classify(ctx.dict.get(cname)) {
                Some(Stmt::Refine) => {
                    if let Some(target) = attr(doc, &ctx.dict, child, "target-node") {
                        let target = ctx.dict.dup(target);
                        let NodePayload::Uses { refines, .. } = &mut module.node_mut(id).payload
                        else {
                            unreachable!()
                        };
                        refines.push(target);
                    }
                }
                Some(Stmt::Augment) => {
                    if let Some(target) = attr(doc, &ctx.dict, child, "target-node") {
                        let target = ctx.dict.dup(target);
                        let NodePayload::Uses { augments, .. } = &mut module.node_mut(id).payload
                        else {
                            unreachable!()
                        };
                        augments.push(target);
                    }
                }
                _ => {}
            }
        }

        // a uses inside a grouping stays unresolved until instantiation
        if !inside_grouping(module, parent) {
            let target = types::resolve_uses(ctx, module, parent, id, line)?;
            let NodePayload::Uses { grouping, .. } = &mut module.node_mut(id).payload else {
                unreachable!()
            };
            *grouping = Some(target);
        }

        attach(ctx, module, parent, id, line)
    })();

    match body {
        Ok(()) => Ok(id),
        Err(err) => {
            module.free_node(&mut ctx.dict, id);
            Err(err)
        }
    }
}
