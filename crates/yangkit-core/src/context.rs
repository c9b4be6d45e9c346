//! Context: the registry of loaded modules.
//!
//! A context owns the dictionary, the diagnostic sink, and every compiled
//! module and submodule. Modules live in a slot vector so their ids stay
//! stable; a compilation that fails leaves a tombstone slot and is otherwise
//! rolled back. Teardown releases modules in reverse registration order,
//! then drops the dictionary.

use crate::diag::{DiagSink, Diagnostic, ValidationCode, Verbosity};
use crate::dict::Dict;
use crate::error::{Error, Result};
use crate::ids::{ModuleId, StrId, SubmoduleId};
use crate::schema::Module;
use crate::xml::{Attr, AttrKind, XmlDoc};
use crate::yin;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Caller-supplied search-path loader.
///
/// The core performs no file I/O of its own; when a module has to be loaded
/// by name, the context asks its locator for the bytes. The filesystem
/// implementation lives in `yangkit-std`.
pub trait ModuleLocator {
    /// Find a module's YIN text by name and optional revision, looking in
    /// `searchpath`. `Ok(None)` means the module does not exist there;
    /// `Err` carries an I/O failure description.
    fn locate(
        &self,
        searchpath: Option<&str>,
        name: &str,
        revision: Option<&str>,
    ) -> core::result::Result<Option<String>, String>;
}

/// Registry of loaded modules and submodules.
pub struct Context {
    pub(crate) dict: Dict,
    pub(crate) sink: DiagSink,
    pub(crate) modules: Vec<Option<Module>>,
    pub(crate) submodules: Vec<Option<Module>>,
    /// Names currently being compiled; guards against import cycles.
    pub(crate) loading: Vec<String>,
    searchpath: Option<String>,
    locator: Option<Box<dyn ModuleLocator>>,
    module_set_id: u64,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dict: Dict::new(),
            sink: DiagSink::new(),
            modules: Vec::new(),
            submodules: Vec::new(),
            loading: Vec::new(),
            searchpath: None,
            locator: None,
            module_set_id: 0,
        }
    }

    // === Configuration ===

    /// Set the directory searched when loading modules by name.
    pub fn set_searchpath(&mut self, path: &str) {
        self.searchpath = Some(path.to_string());
    }

    /// The configured search directory.
    #[must_use]
    pub fn searchpath(&self) -> Option<&str> {
        self.searchpath.as_deref()
    }

    /// Install the loader used to find module files.
    pub fn set_locator(&mut self, locator: Box<dyn ModuleLocator>) {
        self.locator = Some(locator);
    }

    /// Set the diagnostic verbosity threshold.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.sink.set_verbosity(verbosity);
    }

    /// The diagnostic verbosity threshold.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.sink.verbosity()
    }

    /// Diagnostics recorded so far.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.sink.diagnostics()
    }

    /// The most recent error diagnostic.
    #[must_use]
    pub fn last_error(&self) -> Option<&Diagnostic> {
        self.sink.last_error()
    }

    /// The dictionary owned by this context.
    #[must_use]
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    // === Module loading ===

    /// Compile a YIN module from a buffer and register it with
    /// `implement` conformance.
    pub fn parse_module(&mut self, data: &str) -> Result<ModuleId> {
        yin::read_module(self, data, true)
    }

    /// Load a module by name through the locator
    /// (`<name>.yin` / `<name>@<revision>.yin` in the search directory).
    /// A module already registered is returned as-is, promoted to
    /// `implement` conformance.
    pub fn load_module(&mut self, name: &str, revision: Option<&str>) -> Result<ModuleId> {
        if let Some(id) = self.get_module_id(name, revision) {
            self.modules[id.to_index()]
                .as_mut()
                .expect("live module")
                .implemented = true;
            return Ok(id);
        }
        let data = self.locate_file(name, revision)?;
        yin::read_module(self, &data, true)
    }

    /// Registered module by id.
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.to_index()).and_then(Option::as_ref)
    }

    /// Registered submodule by id.
    #[must_use]
    pub fn submodule(&self, id: SubmoduleId) -> Option<&Module> {
        self.submodules.get(id.to_index()).and_then(Option::as_ref)
    }

    /// Look up a module by name; with no revision, the newest registered
    /// revision wins.
    #[must_use]
    pub fn get_module(&self, name: &str, revision: Option<&str>) -> Option<&Module> {
        self.get_module_id(name, revision).and_then(|id| self.module(id))
    }

    /// Look up a submodule of `parent` by name.
    #[must_use]
    pub fn get_submodule(
        &self,
        parent: ModuleId,
        name: &str,
        revision: Option<&str>,
    ) -> Option<&Module> {
        self.find_submodule_id(parent, name, revision)
            .and_then(|id| self.submodule(id))
    }

    /// Names of registered modules, in registration order.
    #[must_use]
    pub fn module_names(&self) -> Vec<&str> {
        self.modules
            .iter()
            .flatten()
            .map(|m| self.dict.get(m.name))
            .collect()
    }

    /// Iterate registered modules in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter().flatten()
    }

    // === Features ===

    /// Enable a feature (`"*"` enables all) of a module.
    pub fn feature_enable(&mut self, module: ModuleId, name: &str) -> Result<()> {
        self.feature_set(module, name, true)
    }

    /// Disable a feature (`"*"` disables all) of a module.
    pub fn feature_disable(&mut self, module: ModuleId, name: &str) -> Result<()> {
        self.feature_set(module, name, false)
    }

    fn feature_set(&mut self, module: ModuleId, name: &str, value: bool) -> Result<()> {
        let dict = &self.dict;
        let Some(m) = self.modules.get_mut(module.to_index()).and_then(Option::as_mut) else {
            return Err(Error::Unresolved("unknown module".into()));
        };
        if name == "*" {
            for f in &mut m.features {
                f.enabled = value;
            }
            return Ok(());
        }
        match m.features.iter_mut().find(|f| dict.get(f.name) == name) {
            Some(f) => {
                f.enabled = value;
                Ok(())
            }
            None => Err(Error::Unresolved(format!("unknown feature \"{name}\""))),
        }
    }

    // === ietf-yang-library ===

    /// Synthesize an instance tree conformant with
    /// `ietf-yang-library@2015-07-03` describing the loaded modules. The
    /// tree and the dictionary holding its strings are returned together.
    #[must_use]
    pub fn info(&self) -> (XmlDoc, Dict) {
        let mut dict = Dict::new();
        let mut doc = XmlDoc::new();

        let root_name = dict.insert("modules");
        let root = doc.alloc(Some(root_name), 1);
        doc.set_root(Some(root));
        let uri = dict.insert("urn:ietf:params:xml:ns:yang:ietf-yang-library");
        doc.elem_mut(root).attrs.push(Attr {
            kind: AttrKind::Ns,
            name: None,
            value: uri,
        });
        let root_ns = doc.get_ns(&dict, root, None);
        doc.elem_mut(root).ns = root_ns;

        Self::add_text_child(
            &mut doc,
            &mut dict,
            root,
            "module-set-id",
            &self.module_set_id.to_string(),
        );

        for m in self.modules.iter().flatten() {
            let entry_name = dict.insert("module");
            let entry = doc.alloc(Some(entry_name), 1);
            doc.add_child(root, entry);
            let entry_ns = doc.get_ns(&dict, entry, None);
            doc.elem_mut(entry).ns = entry_ns;

            Self::add_text_child(&mut doc, &mut dict, entry, "name", self.dict.get(m.name));
            let revision = m
                .newest_revision(&self.dict)
                .map(|r| self.dict.get(r))
                .unwrap_or("");
            Self::add_text_child(&mut doc, &mut dict, entry, "revision", revision);
            let namespace = m.namespace.map(|n| self.dict.get(n)).unwrap_or("");
            Self::add_text_child(&mut doc, &mut dict, entry, "namespace", namespace);
            let conformance = if m.implemented { "implement" } else { "import" };
            Self::add_text_child(&mut doc, &mut dict, entry, "conformance", conformance);

            if !m.includes.is_empty() {
                let subs_name = dict.insert("submodules");
                let subs = doc.alloc(Some(subs_name), 1);
                doc.add_child(entry, subs);
                for inc in &m.includes {
                    let Some(sub) = self.submodule(inc.submodule) else {
                        continue;
                    };
                    let sub_name = dict.insert("submodule");
                    let sub_entry = doc.alloc(Some(sub_name), 1);
                    doc.add_child(subs, sub_entry);
                    Self::add_text_child(
                        &mut doc,
                        &mut dict,
                        sub_entry,
                        "name",
                        self.dict.get(sub.name),
                    );
                    let sub_rev = sub
                        .newest_revision(&self.dict)
                        .map(|r| self.dict.get(r))
                        .unwrap_or("");
                    Self::add_text_child(&mut doc, &mut dict, sub_entry, "revision", sub_rev);
                }
            }
        }

        (doc, dict)
    }

    fn add_text_child(
        doc: &mut XmlDoc,
        dict: &mut Dict,
        parent: crate::ids::ElemId,
        name: &str,
        text: &str,
    ) {
        let name = dict.insert(name);
        let elem = doc.alloc(Some(name), 1);
        let content = dict.insert(text);
        doc.elem_mut(elem).content = Some(content);
        doc.add_child(parent, elem);
        let ns = doc.get_ns(dict, elem, None);
        doc.elem_mut(elem).ns = ns;
    }

    // === Internals used by the YIN reader ===

    pub(crate) fn module_ref(&self, id: ModuleId) -> Option<&Module> {
        self.module(id)
    }

    pub(crate) fn submodule_ref(&self, id: SubmoduleId) -> Option<&Module> {
        self.submodule(id)
    }

    pub(crate) fn bump_module_set(&mut self) {
        self.module_set_id += 1;
    }

    fn get_module_id(&self, name: &str, revision: Option<&str>) -> Option<ModuleId> {
        let name_id = self.dict.find(name)?;
        match revision {
            Some(rev) => self.module_slot_ids().find(|&id| {
                let m = self.module(id).expect("live module");
                m.name == name_id
                    && m.revisions.iter().any(|r| self.dict.get(r.date) == rev)
            }),
            None => {
                // newest revision wins; a module without revisions ranks lowest
                let mut best: Option<(ModuleId, String)> = None;
                for id in self.module_slot_ids() {
                    let m = self.module(id).expect("live module");
                    if m.name != name_id {
                        continue;
                    }
                    let newest = m
                        .newest_revision(&self.dict)
                        .map(|r| self.dict.get(r).to_string())
                        .unwrap_or_default();
                    match &best {
                        Some((_, cur)) if *cur >= newest => {}
                        _ => best = Some((id, newest)),
                    }
                }
                best.map(|(id, _)| id)
            }
        }
    }

    fn module_slot_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_some())
            .map(|(i, _)| ModuleId::from_index(i).expect("valid index"))
    }

    fn find_submodule_id(
        &self,
        parent: ModuleId,
        name: &str,
        revision: Option<&str>,
    ) -> Option<SubmoduleId> {
        let name_id = self.dict.find(name)?;
        let mut best: Option<(SubmoduleId, String)> = None;
        for (i, slot) in self.submodules.iter().enumerate() {
            let Some(sub) = slot else { continue };
            if sub.name != name_id || sub.belongs_to != Some(parent) {
                continue;
            }
            let id = SubmoduleId::from_index(i).expect("valid index");
            match revision {
                Some(rev) => {
                    if sub.revisions.iter().any(|r| self.dict.get(r.date) == rev) {
                        return Some(id);
                    }
                }
                None => {
                    let newest = sub
                        .newest_revision(&self.dict)
                        .map(|r| self.dict.get(r).to_string())
                        .unwrap_or_default();
                    match &best {
                        Some((_, cur)) if *cur >= newest => {}
                        _ => best = Some((id, newest)),
                    }
                }
            }
        }
        best.map(|(id, _)| id)
    }

    /// Find a registered module or load it from the search directory; used
    /// by import resolution, so the loaded module gets `import` conformance.
    pub(crate) fn get_or_load_module(
        &mut self,
        name: &str,
        revision: Option<&str>,
    ) -> Result<ModuleId> {
        if let Some(id) = self.get_module_id(name, revision) {
            return Ok(id);
        }
        if self.loading.iter().any(|n| n == name) {
            let msg = format!("circular dependency on module \"{name}\"");
            self.sink
                .error(ValidationCode::InvalidArgument, None, msg.clone());
            return Err(Error::Conflict(msg));
        }
        let data = self.locate_file(name, revision)?;
        yin::read_module(self, &data, false)
    }

    /// Find a registered submodule of `owner` or load it from the search
    /// directory.
    pub(crate) fn get_or_load_submodule(
        &mut self,
        owner: ModuleId,
        owner_name: &str,
        name: &str,
        revision: Option<&str>,
    ) -> Result<SubmoduleId> {
        if let Some(id) = self.find_submodule_id(owner, name, revision) {
            return Ok(id);
        }
        if self.loading.iter().any(|n| n == name) {
            let msg = format!("circular dependency on submodule \"{name}\"");
            self.sink
                .error(ValidationCode::InvalidArgument, None, msg.clone());
            return Err(Error::Conflict(msg));
        }
        let data = self.locate_file(name, revision)?;
        yin::read_submodule(self, owner, owner_name, &data)
    }

    fn locate_file(&mut self, name: &str, revision: Option<&str>) -> Result<String> {
        let Some(locator) = &self.locator else {
            let msg = format!("cannot load \"{name}\": no module locator configured");
            self.sink.warning(None, msg.clone());
            return Err(Error::Io(msg));
        };
        match locator.locate(self.searchpath.as_deref(), name, revision) {
            Ok(Some(data)) => Ok(data),
            Ok(None) => {
                let msg = format!("module \"{name}\" not found in the search directory");
                self.sink.warning(None, msg.clone());
                Err(Error::Io(msg))
            }
            Err(io) => {
                let msg = format!("loading \"{name}\" failed: {io}");
                self.sink.warning(None, msg.clone());
                Err(Error::Io(msg))
            }
        }
    }

    /// Reject a module whose (name, newest revision) duplicates a
    /// registered one. Modules without revisions conflict with each other;
    /// a revisionless module does not conflict with a revisioned one.
    pub(crate) fn check_duplicate(&mut self, module: &Module) -> Result<()> {
        let mut dup = false;
        for other in self.modules.iter().flatten() {
            if other.name != module.name {
                continue;
            }
            if other.revisions.is_empty() && module.revisions.is_empty() {
                dup = true;
                break;
            }
            if other.revisions.is_empty() || module.revisions.is_empty() {
                continue;
            }
            let a = other.newest_revision(&self.dict).map(|r| self.dict.get(r));
            let b = module.newest_revision(&self.dict).map(|r| self.dict.get(r));
            if a == b {
                dup = true;
                break;
            }
        }
        if dup {
            let msg = format!(
                "module \"{}\" already registered in the context",
                self.dict.get(module.name)
            );
            self.sink
                .error(ValidationCode::DuplicateModule, None, msg.clone());
            return Err(Error::Conflict(msg));
        }
        Ok(())
    }

    /// Drop every derived-identity reference owned by a failed module.
    pub(crate) fn purge_derived(&mut self, owner: crate::schema::ModuleHandle) {
        for slot in self.modules.iter_mut().chain(self.submodules.iter_mut()) {
            let Some(m) = slot else { continue };
            for ident in &mut m.identities {
                ident.derived.retain(|r| r.owner != owner);
            }
        }
    }

    /// Live dictionary reference count of a string, for tests and
    /// invariant checks.
    #[must_use]
    pub fn refcount(&self, id: StrId) -> u32 {
        self.dict.refcount(id)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // modules in reverse registration order, then submodules, then the
        // dictionary itself
        for i in (0..self.modules.len()).rev() {
            if let Some(m) = self.modules[i].take() {
                m.release(&mut self.dict);
            }
        }
        for i in (0..self.submodules.len()).rev() {
            if let Some(m) = self.submodules[i].take() {
                m.release(&mut self.dict);
            }
        }
    }
}
