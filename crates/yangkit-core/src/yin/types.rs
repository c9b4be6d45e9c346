//! Type, typedef, identity, and grouping resolution for the YIN reader.

use super::{attr, read_common, verr};
use crate::context::Context;
use crate::diag::ValidationCode;
use crate::error::Result;
use crate::ids::{ElemId, NodeId};
use crate::schema::types::BitSpec;
use crate::schema::{
    EnumSpec, GrpRef, IdentRef, Identity, Module, ModuleHandle, NodeKind, Type, TypeBase, TypeDer,
    TypeInfo, Typedef,
};
use crate::xml::XmlDoc;
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;

/// Split a possibly qualified name into `(prefix, local)`.
fn split_prefix(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Outcome of a typedef search.
enum TpdfLookup {
    Found(crate::schema::TpdfRef, TypeBase),
    UnknownPrefix,
    NotFound,
}

/// Search for the typedef a type name derives from.
///
/// Unprefixed names walk the enclosing-node ancestor chain (typedef tables
/// of container, list, and grouping ancestors; other kinds are skipped),
/// then the module's top-level typedefs, then each included submodule's.
/// Prefixed names route through the module's imports and search the target
/// module's top level (and its submodules).
fn find_superior_type(
    ctx: &Context,
    module: &Module,
    scope: Option<NodeId>,
    prefix: Option<&str>,
    name: &str,
) -> TpdfLookup {
    use crate::schema::TpdfRef;

    let search_top = |m: &Module, handle: ModuleHandle, name_id| -> Option<TpdfRef> {
        m.typedefs
            .iter()
            .position(|t| t.name == name_id)
            .map(|i| TpdfRef::Top(handle, i as u32))
    };

    if let Some(prefix) = prefix {
        let Some(imp) = module
            .imports
            .iter()
            .find(|i| ctx.dict.get(i.prefix) == prefix)
        else {
            return TpdfLookup::UnknownPrefix;
        };
        let Some(name_id) = ctx.dict.find(name) else {
            return TpdfLookup::NotFound;
        };
        let Some(target) = ctx.module_ref(imp.module) else {
            return TpdfLookup::NotFound;
        };
        if let Some(r) = search_top(target, ModuleHandle::Module(imp.module), name_id) {
            let base = tpdf_base(ctx, module, &r);
            return TpdfLookup::Found(r, base);
        }
        for inc in &target.includes {
            if let Some(sub) = ctx.submodule_ref(inc.submodule) {
                if let Some(r) =
                    search_top(sub, ModuleHandle::Submodule(inc.submodule), name_id)
                {
                    let base = tpdf_base(ctx, module, &r);
                    return TpdfLookup::Found(r, base);
                }
            }
        }
        return TpdfLookup::NotFound;
    }

    let Some(name_id) = ctx.dict.find(name) else {
        return TpdfLookup::NotFound;
    };

    // enclosing scopes, innermost first
    let mut cur = scope;
    while let Some(node_id) = cur {
        let node = module.node(node_id);
        if let Some(typedefs) = node.typedefs() {
            if let Some(i) = typedefs.iter().position(|t| t.name == name_id) {
                let r = TpdfRef::Node(module.handle, node_id, i as u32);
                let base = tpdf_base(ctx, module, &r);
                return TpdfLookup::Found(r, base);
            }
        }
        cur = node.parent;
    }

    if let Some(r) = search_top(module, module.handle, name_id) {
        let base = tpdf_base(ctx, module, &r);
        return TpdfLookup::Found(r, base);
    }
    for inc in &module.includes {
        if let Some(sub) = ctx.submodule_ref(inc.submodule) {
            if let Some(r) = search_top(sub, ModuleHandle::Submodule(inc.submodule), name_id) {
                let base = tpdf_base(ctx, module, &r);
                return TpdfLookup::Found(r, base);
            }
        }
    }
    TpdfLookup::NotFound
}

/// Base kind of the typedef a reference points at.
fn tpdf_base(ctx: &Context, module: &Module, r: &crate::schema::TpdfRef) -> TypeBase {
    tpdf_at(ctx, module, r).map_or(TypeBase::Empty, |t| t.ty.base)
}

fn tpdf_at<'a>(
    ctx: &'a Context,
    module: &'a Module,
    r: &crate::schema::TpdfRef,
) -> Option<&'a Typedef> {
    use crate::schema::TpdfRef;
    let (handle, table, index) = match *r {
        TpdfRef::Top(handle, i) => (handle, None, i),
        TpdfRef::Node(handle, node, i) => (handle, Some(node), i),
    };
    let owner: &Module = if handle == module.handle {
        module
    } else {
        match handle {
            ModuleHandle::Module(id) => ctx.module_ref(id)?,
            ModuleHandle::Submodule(id) => ctx.submodule_ref(id)?,
        }
    };
    match table {
        None => owner.typedefs.get(index as usize),
        Some(node) => owner.node(node).typedefs()?.get(index as usize),
    }
}

/// Read a `typedef` statement.
pub(super) fn fill_typedef(
    ctx: &mut Context,
    module: &mut Module,
    scope: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<Typedef> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, false)?;
    let mut ty: Option<Type> = None;

    let children: Vec<ElemId> = doc.children(elem).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            continue;
        };
        let is_type = ctx.dict.get(cname) == "type";
        if !is_type {
            continue;
        }
        let cline = doc.elem(child).line;
        if let Some(prev) = ty.take() {
            prev.release(&mut ctx.dict);
            meta.release(&mut ctx.dict);
            return Err(verr(
                ctx,
                ValidationCode::TooManyStatements,
                cline,
                "\"type\" appears more than once in \"typedef\"".into(),
            ));
        }
        match fill_type(ctx, module, scope, doc, child) {
            Ok(t) => ty = Some(t),
            Err(err) => {
                meta.release(&mut ctx.dict);
                return Err(err);
            }
        }
    }

    let Some(ty) = ty else {
        meta.release(&mut ctx.dict);
        return Err(verr(
            ctx,
            ValidationCode::MissingStatement,
            line,
            "missing \"type\" statement in \"typedef\"".into(),
        ));
    };

    Ok(Typedef {
        name: meta.name,
        ty,
        dsc: meta.dsc,
        reference: meta.reference,
        status: meta.status.unwrap_or_default(),
    })
}

/// Read a `type` statement: resolve the derivation, copy the base kind,
/// and parse the kind-specific payload.
pub(super) fn fill_type(
    ctx: &mut Context,
    module: &mut Module,
    scope: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
) -> Result<Type> {
    let line = doc.elem(elem).line;
    let Some(name_attr) = attr(doc, &ctx.dict, elem, "name") else {
        return Err(verr(
            ctx,
            ValidationCode::MissingArgument,
            line,
            "missing \"name\" argument in \"type\"".into(),
        ));
    };
    let qname = ctx.dict.get(name_attr).to_string();
    let (written_prefix, local) = split_prefix(&qname);

    // a prefix referring to the current module is dropped for lookup
    let own_prefix = module.prefix.map(|p| ctx.dict.get(p).to_string());
    let lookup_prefix = match written_prefix {
        Some(p) if Some(p) == own_prefix.as_deref() => None,
        other => other,
    };

    let builtin = if lookup_prefix.is_none() {
        TypeBase::from_name(local)
    } else {
        None
    };
    let (der, base) = match builtin {
        Some(base) => (TypeDer::Builtin, base),
        None => match find_superior_type(ctx, module, scope, lookup_prefix, local) {
            TpdfLookup::Found(r, base) => (TypeDer::Tpdf(r), base),
            TpdfLookup::UnknownPrefix => {
                return Err(verr(
                    ctx,
                    ValidationCode::UnresolvedPrefix,
                    line,
                    format!("unresolvable prefix in type \"{qname}\""),
                ))
            }
            TpdfLookup::NotFound => {
                return Err(verr(
                    ctx,
                    ValidationCode::InvalidArgument,
                    line,
                    format!("invalid \"type\" name \"{qname}\""),
                ))
            }
        },
    };

    let prefix = written_prefix.map(|p| ctx.dict.insert(p));
    let derived = matches!(der, TypeDer::Tpdf(_));
    match parse_type_info(ctx, module, scope, doc, elem, base, derived) {
        Ok(info) => Ok(Type {
            base,
            prefix,
            der,
            info,
        }),
        Err(err) => {
            if let Some(p) = prefix {
                ctx.dict.remove(p);
            }
            Err(err)
        }
    }
}

/// Kind-specific payload parsing, dispatched on the resolved base kind.
/// Enumerations and identityrefs are parsed in full; the remaining kinds
/// record their raw restrictions.
fn parse_type_info(
    ctx: &mut Context,
    module: &mut Module,
    scope: Option<NodeId>,
    doc: &mut XmlDoc,
    elem: ElemId,
    base: TypeBase,
    derived: bool,
) -> Result<TypeInfo> {
    match base {
        TypeBase::Enumeration => Ok(match parse_enums(ctx, doc, elem, derived)? {
            Some(enums) => TypeInfo::Enums(enums),
            None => TypeInfo::None,
        }),
        TypeBase::Identityref => parse_identityref(ctx, module, doc, elem),
        TypeBase::Leafref => {
            let path = named_child(ctx, doc, elem, "path")
                .and_then(|c| attr(doc, &ctx.dict, c, "value"))
                .map(|v| ctx.dict.dup(v));
            Ok(TypeInfo::Leafref(path))
        }
        TypeBase::Decimal64 => {
            let Some(child) = named_child(ctx, doc, elem, "fraction-digits") else {
                return Ok(TypeInfo::None);
            };
            let cline = doc.elem(child).line;
            let value = attr(doc, &ctx.dict, child, "value")
                .map(|v| ctx.dict.get(v).to_string())
                .unwrap_or_default();
            match value.parse::<u8>() {
                Ok(digits @ 1..=18) => Ok(TypeInfo::Dec64 {
                    fraction_digits: digits,
                }),
                _ => Err(verr(
                    ctx,
                    ValidationCode::InvalidArgument,
                    cline,
                    format!("invalid \"fraction-digits\" value \"{value}\""),
                )),
            }
        }
        _ if base.is_integer() => {
            let range = named_child(ctx, doc, elem, "range")
                .and_then(|c| attr(doc, &ctx.dict, c, "value"))
                .map(|v| ctx.dict.dup(v));
            Ok(match range {
                Some(r) => TypeInfo::Range(Some(r)),
                None => TypeInfo::None,
            })
        }
        TypeBase::String => {
            let length = named_child(ctx, doc, elem, "length")
                .and_then(|c| attr(doc, &ctx.dict, c, "value"))
                .map(|v| ctx.dict.dup(v));
            let mut patterns = Vec::new();
            let children: Vec<ElemId> = doc.children(elem).collect();
            for child in children {
                let Some(cname) = doc.elem(child).name else {
                    continue;
                };
                if ctx.dict.get(cname) != "pattern" {
                    continue;
                }
                if let Some(value) = attr(doc, &ctx.dict, child, "value") {
                    let value = ctx.dict.dup(value);
                    patterns.push(value);
                }
            }
            if length.is_none() && patterns.is_empty() {
                Ok(TypeInfo::None)
            } else {
                Ok(TypeInfo::Str { length, patterns })
            }
        }
        TypeBase::Binary => {
            let length = named_child(ctx, doc, elem, "length")
                .and_then(|c| attr(doc, &ctx.dict, c, "value"))
                .map(|v| ctx.dict.dup(v));
            Ok(match length {
                Some(l) => TypeInfo::Binary(Some(l)),
                None => TypeInfo::None,
            })
        }
        TypeBase::Union => {
            let mut members: Vec<Type> = Vec::new();
            let children: Vec<ElemId> = doc.children(elem).collect();
            for child in children {
                let Some(cname) = doc.elem(child).name else {
                    continue;
                };
                if ctx.dict.get(cname) != "type" {
                    continue;
                }
                match fill_type(ctx, module, scope, doc, child) {
                    Ok(t) => members.push(t),
                    Err(err) => {
                        for m in &members {
                            m.release(&mut ctx.dict);
                        }
                        return Err(err);
                    }
                }
            }
            if members.is_empty() {
                Ok(TypeInfo::None)
            } else {
                Ok(TypeInfo::Union(members))
            }
        }
        TypeBase::Bits => {
            let mut bits: Vec<BitSpec> = Vec::new();
            let children: Vec<ElemId> = doc.children(elem).collect();
            for child in children {
                let Some(cname) = doc.elem(child).name else {
                    continue;
                };
                if ctx.dict.get(cname) != "bit" {
                    continue;
                }
                let cline = doc.elem(child).line;
                let Some(name) = attr(doc, &ctx.dict, child, "name") else {
                    for b in &bits {
                        ctx.dict.remove(b.name);
                    }
                    return Err(verr(
                        ctx,
                        ValidationCode::MissingArgument,
                        cline,
                        "missing \"name\" argument in \"bit\"".into(),
                    ));
                };
                let position = named_child(ctx, doc, child, "position")
                    .and_then(|p| attr(doc, &ctx.dict, p, "value"))
                    .and_then(|v| ctx.dict.get(v).parse::<u32>().ok());
                let name = ctx.dict.dup(name);
                bits.push(BitSpec { name, position });
            }
            if bits.is_empty() {
                Ok(TypeInfo::None)
            } else {
                Ok(TypeInfo::Bits(bits))
            }
        }
        _ => Ok(TypeInfo::None),
    }
}

/// First child with the given statement name.
fn named_child(ctx: &Context, doc: &XmlDoc, elem: ElemId, name: &str) -> Option<ElemId> {
    doc.children(elem).find(|&c| {
        doc.elem(c)
            .name
            .is_some_and(|n| ctx.dict.get(n) == name)
    })
}

/// Parse an `identityref`'s mandatory single `base` statement.
fn parse_identityref(
    ctx: &mut Context,
    module: &mut Module,
    doc: &XmlDoc,
    elem: ElemId,
) -> Result<TypeInfo> {
    let line = doc.elem(elem).line;
    let named: Vec<ElemId> = doc
        .children(elem)
        .filter(|&c| doc.elem(c).name.is_some())
        .collect();
    let Some(&first) = named.first() else {
        return Err(verr(
            ctx,
            ValidationCode::MissingStatement,
            line,
            "missing \"base\" statement in identityref \"type\"".into(),
        ));
    };
    let first_name = ctx.dict.get(doc.elem(first).name.unwrap()).to_string();
    if first_name != "base" {
        return Err(verr(
            ctx,
            ValidationCode::UnknownStatement,
            doc.elem(first).line,
            format!("invalid statement \"{first_name}\" in identityref \"type\""),
        ));
    }
    if named.len() > 1 {
        let extra = ctx
            .dict
            .get(doc.elem(named[1]).name.unwrap())
            .to_string();
        return Err(verr(
            ctx,
            ValidationCode::UnknownStatement,
            doc.elem(named[1]).line,
            format!("invalid statement \"{extra}\" in identityref \"type\""),
        ));
    }
    let cline = doc.elem(first).line;
    let Some(arg) = attr(doc, &ctx.dict, first, "name") else {
        return Err(verr(
            ctx,
            ValidationCode::MissingArgument,
            cline,
            "missing \"name\" argument in \"base\"".into(),
        ));
    };
    let arg = ctx.dict.get(arg).to_string();
    let base = resolve_base(ctx, module, None, &arg, cline)?;
    Ok(TypeInfo::Identityref(base))
}

/// Parse the `enum` members of an enumeration type.
///
/// Returns `None` when the type is a typedef derivation that adds no enum
/// restriction of its own.
fn parse_enums(
    ctx: &mut Context,
    doc: &mut XmlDoc,
    elem: ElemId,
    derived: bool,
) -> Result<Option<Vec<EnumSpec>>> {
    let line = doc.elem(elem).line;

    // detach enum statements into a staging list
    let mut staged: Vec<ElemId> = Vec::new();
    let children: Vec<ElemId> = doc.children(elem).collect();
    for child in children {
        let Some(cname) = doc.elem(child).name else {
            continue;
        };
        if ctx.dict.get(cname) == "enum" {
            doc.unlink(child);
            staged.push(child);
        }
    }

    // nothing but enum statements is allowed here
    let leftover = doc
        .children(elem)
        .find(|&c| doc.elem(c).name.is_some());
    if let Some(extra) = leftover {
        let name = ctx.dict.get(doc.elem(extra).name.unwrap()).to_string();
        let eline = doc.elem(extra).line;
        for &e in &staged {
            doc.free_elem(&mut ctx.dict, e);
        }
        return Err(verr(
            ctx,
            ValidationCode::UnknownStatement,
            eline,
            format!("invalid statement \"{name}\" in enumeration \"type\""),
        ));
    }

    if staged.is_empty() {
        if derived {
            // a derived type with no enums of its own
            return Ok(None);
        }
        return Err(verr(
            ctx,
            ValidationCode::MissingStatement,
            line,
            "missing \"enum\" statement in enumeration \"type\"".into(),
        ));
    }

    let mut enums: Vec<EnumSpec> = Vec::with_capacity(staged.len());
    let mut highest: Option<i64> = None;
    for i in 0..staged.len() {
        let e = staged[i];
        let result = parse_one_enum(ctx, doc, e, &mut enums, &mut highest);
        doc.free_elem(&mut ctx.dict, e);
        if let Err(err) = result {
            for &rest in &staged[i + 1..] {
                doc.free_elem(&mut ctx.dict, rest);
            }
            for spec in &enums {
                ctx.dict.remove(spec.name);
                if let Some(d) = spec.dsc {
                    ctx.dict.remove(d);
                }
                if let Some(r) = spec.reference {
                    ctx.dict.remove(r);
                }
            }
            return Err(err);
        }
    }
    Ok(Some(enums))
}

fn parse_one_enum(
    ctx: &mut Context,
    doc: &XmlDoc,
    elem: ElemId,
    enums: &mut Vec<EnumSpec>,
    highest: &mut Option<i64>,
) -> Result<()> {
    let line = doc.elem(elem).line;
    let meta = read_common(ctx, doc, elem, false)?;

    let name_string = ctx.dict.get(meta.name).to_string();
    let ws = name_string.chars().next().is_some_and(char::is_whitespace)
        || name_string.chars().last().is_some_and(char::is_whitespace);
    if ws {
        meta.release(&mut ctx.dict);
        return Err(verr(
            ctx,
            ValidationCode::EnumNameWhitespace,
            line,
            format!("enum name \"{name_string}\" has leading or trailing whitespace"),
        ));
    }
    if enums.iter().any(|e| e.name == meta.name) {
        meta.release(&mut ctx.dict);
        return Err(verr(
            ctx,
            ValidationCode::DuplicateEnumName,
            line,
            format!("duplicated enum name \"{name_string}\""),
        ));
    }

    let value_elem = named_child(ctx, doc, elem, "value");
    let value = match value_elem {
        Some(ve) => {
            let vline = doc.elem(ve).line;
            let value_str = attr(doc, &ctx.dict, ve, "value")
                .map(|v| ctx.dict.get(v).to_string())
                .unwrap_or_default();
            let Ok(v) = value_str.trim().parse::<i64>() else {
                meta.release(&mut ctx.dict);
                return Err(verr(
                    ctx,
                    ValidationCode::InvalidArgument,
                    vline,
                    format!("invalid \"value\" \"{value_str}\" of enum \"{name_string}\""),
                ));
            };
            if v < i64::from(i32::MIN) || v > i64::from(i32::MAX) {
                meta.release(&mut ctx.dict);
                return Err(verr(
                    ctx,
                    ValidationCode::InvalidArgument,
                    vline,
                    format!("enum value {v} out of the int32 range"),
                ));
            }
            if enums.iter().any(|e| i64::from(e.value) == v) {
                meta.release(&mut ctx.dict);
                return Err(verr(
                    ctx,
                    ValidationCode::DuplicateEnumValue,
                    vline,
                    format!("duplicated enum value {v} (enum \"{name_string}\")"),
                ));
            }
            v
        }
        None => {
            // auto-assign one greater than the highest assigned value
            let next = highest.map_or(0, |h| h + 1);
            if next > i64::from(i32::MAX) {
                meta.release(&mut ctx.dict);
                return Err(verr(
                    ctx,
                    ValidationCode::InvalidArgument,
                    line,
                    format!("no auto-assignable value left for enum \"{name_string}\""),
                ));
            }
            next
        }
    };

    *highest = Some(highest.map_or(value, |h| h.max(value)));
    enums.push(EnumSpec {
        name: meta.name,
        dsc: meta.dsc,
        reference: meta.reference,
        status: meta.status.unwrap_or_default(),
        value: value as i32,
    });
    Ok(())
}

// === Identity resolution ===

fn ident_mut<'a>(ctx: &'a mut Context, module: &'a mut Module, r: IdentRef) -> &'a mut Identity {
    if r.owner == module.handle {
        &mut module.identities[r.index as usize]
    } else {
        let owner = match r.owner {
            ModuleHandle::Module(id) => ctx.modules[id.to_index()]
                .as_mut()
                .expect("live module"),
            ModuleHandle::Submodule(id) => ctx.submodules[id.to_index()]
                .as_mut()
                .expect("live submodule"),
        };
        &mut owner.identities[r.index as usize]
    }
}

/// Locate an identity by its (possibly prefixed) name; when `binder` names
/// an identity of the current module, its `base` link is set.
///
/// Derived-list propagation is a separate step
/// ([`propagate_derived`]), run after every base of the module is bound so
/// forward references produce complete transitive lists.
pub(super) fn resolve_base(
    ctx: &mut Context,
    module: &mut Module,
    binder: Option<usize>,
    base_arg: &str,
    line: u32,
) -> Result<IdentRef> {
    let (written_prefix, local) = split_prefix(base_arg);
    let own_prefix = module.prefix.map(|p| ctx.dict.get(p).to_string());
    let prefix = match written_prefix {
        Some(p) if Some(p) == own_prefix.as_deref() => None,
        other => other,
    };

    let name_id = ctx.dict.find(local);
    let found = match prefix {
        Some(p) => {
            let Some(imp) = module
                .imports
                .iter()
                .find(|i| ctx.dict.get(i.prefix) == p)
            else {
                return Err(verr(
                    ctx,
                    ValidationCode::UnresolvedPrefix,
                    line,
                    format!("unresolvable prefix in \"{base_arg}\""),
                ));
            };
            let target_id = imp.module;
            name_id.and_then(|nid| {
                ctx.module_ref(target_id).and_then(|m| {
                    m.identities
                        .iter()
                        .position(|i| i.name == nid)
                        .map(|idx| IdentRef {
                            owner: ModuleHandle::Module(target_id),
                            index: idx as u32,
                        })
                })
            })
        }
        None => name_id.and_then(|nid| {
            // included submodules first, then the module itself
            module
                .includes
                .iter()
                .find_map(|inc| {
                    ctx.submodule_ref(inc.submodule).and_then(|sub| {
                        sub.identities
                            .iter()
                            .position(|i| i.name == nid)
                            .map(|idx| IdentRef {
                                owner: ModuleHandle::Submodule(inc.submodule),
                                index: idx as u32,
                            })
                    })
                })
                .or_else(|| {
                    module
                        .identities
                        .iter()
                        .position(|i| i.name == nid)
                        .map(|idx| IdentRef {
                            owner: module.handle,
                            index: idx as u32,
                        })
                })
        }),
    };

    let Some(base_ref) = found else {
        return Err(verr(
            ctx,
            ValidationCode::InvalidArgument,
            line,
            format!("unknown identity \"{base_arg}\""),
        ));
    };

    if let Some(idx) = binder {
        let self_ref = IdentRef {
            owner: module.handle,
            index: idx as u32,
        };
        if base_ref == self_ref {
            return Err(verr(
                ctx,
                ValidationCode::InvalidArgument,
                line,
                format!("identity \"{base_arg}\" derived from itself"),
            ));
        }
        module.identities[idx].base = Some(base_ref);
    }
    Ok(base_ref)
}

/// Append an identity to the derived list of each of its ancestors,
/// walking the (now fully bound) base chain upward.
pub(super) fn propagate_derived(
    ctx: &mut Context,
    module: &mut Module,
    idx: usize,
    line: u32,
) -> Result<()> {
    let self_ref = IdentRef {
        owner: module.handle,
        index: idx as u32,
    };
    let mut seen = alloc::vec![self_ref];
    let mut cur = module.identities[idx].base;
    while let Some(r) = cur {
        if seen.contains(&r) {
            let name = ctx.dict.get(module.identities[idx].name).to_string();
            return Err(verr(
                ctx,
                ValidationCode::InvalidArgument,
                line,
                format!("identity derivation cycle through \"{name}\""),
            ));
        }
        seen.push(r);
        let ident = ident_mut(ctx, module, r);
        ident.derived.push(self_ref);
        cur = ident.base;
    }
    Ok(())
}

// === Uses resolution ===

/// Locate the grouping a `uses` refers to: each ancestor's own children
/// (innermost scope first), then the module's top-level groupings, or,
/// with a prefix, the imported module's top level.
pub(super) fn resolve_uses(
    ctx: &mut Context,
    module: &Module,
    parent: Option<NodeId>,
    uses: NodeId,
    line: u32,
) -> Result<GrpRef> {
    let uses_name = ctx.dict.get(module.node(uses).name).to_string();
    let (written_prefix, local) = split_prefix(&uses_name);
    let own_prefix = module.prefix.map(|p| ctx.dict.get(p).to_string());
    let prefix = match written_prefix {
        Some(p) if Some(p) == own_prefix.as_deref() => None,
        other => other,
    };

    let local_id = ctx.dict.find(local);
    let mut found: Option<GrpRef> = None;

    if let Some(p) = prefix {
        let Some(imp) = module
            .imports
            .iter()
            .find(|i| ctx.dict.get(i.prefix) == p)
        else {
            return Err(verr(
                ctx,
                ValidationCode::UnresolvedPrefix,
                line,
                format!("unresolvable prefix in \"{uses_name}\""),
            ));
        };
        if let Some(nid) = local_id {
            if let Some(target) = ctx.module_ref(imp.module) {
                found = target
                    .find_child(None, nid, &[NodeKind::Grouping])
                    .map(|node| GrpRef {
                        owner: ModuleHandle::Module(imp.module),
                        node,
                    });
            }
        }
    } else if let Some(nid) = local_id {
        let mut cur = parent;
        while let Some(p) = cur {
            if let Some(node) = module.find_child(Some(p), nid, &[NodeKind::Grouping]) {
                found = Some(GrpRef {
                    owner: module.handle,
                    node,
                });
                break;
            }
            cur = module.node(p).parent;
        }
        if found.is_none() {
            found = module
                .find_child(None, nid, &[NodeKind::Grouping])
                .map(|node| GrpRef {
                    owner: module.handle,
                    node,
                });
        }
    }

    found.ok_or_else(|| {
        verr(
            ctx,
            ValidationCode::InvalidArgument,
            line,
            format!("invalid argument \"{uses_name}\" to \"uses\""),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::split_prefix;

    #[test]
    fn test_split_prefix() {
        assert_eq!(split_prefix("string"), (None, "string"));
        assert_eq!(split_prefix("p:t"), (Some("p"), "t"));
        assert_eq!(split_prefix("a:b:c"), (Some("a"), "b:c"));
    }
}
