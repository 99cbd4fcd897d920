/*!
# Import Binding Resolution

A single forward scan over the top-level imports discovers how the effect
library is bound in a file. Later imports overwrite earlier ones, the same
way a later binding shadows an earlier one. Type-only imports never bind
anything at run time and are skipped.
*/

use std::collections::HashSet;

use swc_core::ecma::ast::*;
use tracing::trace;

use super::builders;
use crate::config::LibraryProfile;

/// Local names under which the effect library is reachable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectBindings {
    /// Alias of the effect namespace (`Effect` in `Effect.gen(...)`)
    pub namespace: Option<String>,
    /// Alias of a directly imported generator combinator
    pub gen: Option<String>,
}

impl EffectBindings {
    pub fn resolve(module: &Module, profile: &LibraryProfile) -> Self {
        let mut bindings = EffectBindings::default();

        for import in runtime_imports(module) {
            let source = import_source(import);
            let from_namespace_module = profile.namespace_modules.iter().any(|m| *m == source);
            let from_barrel = source == profile.barrel_module;

            for specifier in &import.specifiers {
                match specifier {
                    ImportSpecifier::Namespace(ns) if from_namespace_module => {
                        bindings.namespace = Some(ns.local.sym.to_string());
                    }
                    ImportSpecifier::Named(named) if !named.is_type_only => {
                        let imported = imported_name(named);
                        if from_barrel && imported == profile.namespace_export {
                            bindings.namespace = Some(named.local.sym.to_string());
                        } else if from_namespace_module && imported == profile.gen_export {
                            bindings.gen = Some(named.local.sym.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        trace!(?bindings, "resolved effect bindings");
        bindings
    }

    /// No recognizable import of the library
    pub fn is_empty(&self) -> bool {
        self.namespace.is_none() && self.gen.is_none()
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespace.as_deref() == Some(name)
    }
}

/// How the current stack frame reference is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRef {
    /// `References.CurrentStackFrame`
    Namespace(String),
    /// `CurrentStackFrame` bound by a named import
    Direct(String),
}

impl RegistryRef {
    pub fn current_frame(&self, key: &str) -> Expr {
        match self {
            RegistryRef::Namespace(alias) => builders::member(alias, key),
            RegistryRef::Direct(local) => builders::ident_expr(local),
        }
    }
}

/// Guarantee access to the registry reference, adding an import if needed
pub fn ensure_registry(module: &mut Module, profile: &LibraryProfile) -> RegistryRef {
    let mut namespace = None;
    for import in runtime_imports(module) {
        if import_source(import) != profile.registry_module {
            continue;
        }
        for specifier in &import.specifiers {
            if let ImportSpecifier::Namespace(ns) = specifier {
                namespace = Some(ns.local.sym.to_string());
            }
        }
    }

    match namespace {
        Some(alias) => RegistryRef::Namespace(alias),
        None => RegistryRef::Direct(ensure_named_import(
            module,
            &profile.registry_module,
            &profile.registry_key,
        )),
    }
}

/// Local name of `export` from `source`, importing it when absent.
///
/// An existing named import is reused, and a type-only specifier of the
/// same export is promoted to a runtime one. Otherwise the binding is
/// appended to the last import of `source` that can take named specifiers,
/// and only when there is none is a new import statement inserted after the
/// last top-level import. A binding that would clash with a top-level name
/// is imported under a fresh alias.
pub fn ensure_named_import(module: &mut Module, source: &str, export: &str) -> String {
    let mut existing = None;
    let mut type_only = None;
    let mut append_to = None;

    for (index, item) in module.body.iter().enumerate() {
        let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item else {
            continue;
        };
        if import.type_only || import_source(import) != source {
            continue;
        }
        let mut has_namespace = false;
        for (position, specifier) in import.specifiers.iter().enumerate() {
            match specifier {
                ImportSpecifier::Named(named) if imported_name(named) == export => {
                    if named.is_type_only {
                        type_only = Some((index, position));
                    } else {
                        existing = Some(named.local.sym.to_string());
                    }
                }
                ImportSpecifier::Namespace(_) => has_namespace = true,
                _ => {}
            }
        }
        if !has_namespace {
            append_to = Some(index);
        }
    }

    if let Some(local) = existing {
        return local;
    }

    if let Some((index, position)) = type_only {
        if let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = &mut module.body[index] {
            if let Some(ImportSpecifier::Named(named)) = import.specifiers.get_mut(position) {
                named.is_type_only = false;
                trace!(source, export, "promoted type-only import");
                return named.local.sym.to_string();
            }
        }
    }

    let local = fresh_local(&top_level_names(module), export);

    if let Some(index) = append_to {
        if let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = &mut module.body[index] {
            import
                .specifiers
                .push(builders::named_specifier(export, &local));
            trace!(source, export, local = %local, "appended named import");
            return local;
        }
    }

    let index = insertion_index(module);
    module
        .body
        .insert(index, builders::named_import(source, export, &local));
    trace!(source, export, local = %local, "inserted import");
    local
}

/// `name` itself when free, else the first of `_name`, `_name2`, ... that is
fn fresh_local(bound: &HashSet<String>, name: &str) -> String {
    if !bound.contains(name) {
        return name.to_string();
    }
    let base = format!("_{}", name);
    let mut candidate = base.clone();
    let mut suffix = 2;
    while bound.contains(&candidate) {
        candidate = format!("{}{}", base, suffix);
        suffix += 1;
    }
    candidate
}

/// Names bound at module scope, type-level declarations included
fn top_level_names(module: &Module) -> HashSet<String> {
    let mut names = HashSet::new();

    for item in &module.body {
        match item {
            ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
                for specifier in &import.specifiers {
                    let local = match specifier {
                        ImportSpecifier::Named(named) => &named.local,
                        ImportSpecifier::Default(default) => &default.local,
                        ImportSpecifier::Namespace(ns) => &ns.local,
                    };
                    names.insert(local.sym.to_string());
                }
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => decl_names(&export.decl, &mut names),
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
                let ident = match &export.decl {
                    DefaultDecl::Class(class) => class.ident.as_ref(),
                    DefaultDecl::Fn(function) => function.ident.as_ref(),
                    _ => None,
                };
                if let Some(ident) = ident {
                    names.insert(ident.sym.to_string());
                }
            }
            ModuleItem::ModuleDecl(ModuleDecl::TsImportEquals(import)) => {
                names.insert(import.id.sym.to_string());
            }
            ModuleItem::Stmt(Stmt::Decl(decl)) => decl_names(decl, &mut names),
            _ => {}
        }
    }

    names
}

fn decl_names(decl: &Decl, names: &mut HashSet<String>) {
    match decl {
        Decl::Class(class) => {
            names.insert(class.ident.sym.to_string());
        }
        Decl::Fn(function) => {
            names.insert(function.ident.sym.to_string());
        }
        Decl::Var(var) => {
            for declarator in &var.decls {
                pat_names(&declarator.name, names);
            }
        }
        Decl::TsInterface(interface) => {
            names.insert(interface.id.sym.to_string());
        }
        Decl::TsTypeAlias(alias) => {
            names.insert(alias.id.sym.to_string());
        }
        Decl::TsEnum(ts_enum) => {
            names.insert(ts_enum.id.sym.to_string());
        }
        Decl::TsModule(ts_module) => {
            if let TsModuleName::Ident(ident) = &ts_module.id {
                names.insert(ident.sym.to_string());
            }
        }
        _ => {}
    }
}

fn pat_names(pat: &Pat, names: &mut HashSet<String>) {
    match pat {
        Pat::Ident(binding) => {
            names.insert(binding.id.sym.to_string());
        }
        Pat::Array(array) => {
            for element in array.elems.iter().flatten() {
                pat_names(element, names);
            }
        }
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pat_names(&kv.value, names),
                    ObjectPatProp::Assign(assign) => {
                        names.insert(assign.key.id.sym.to_string());
                    }
                    ObjectPatProp::Rest(rest) => pat_names(&rest.arg, names),
                }
            }
        }
        Pat::Rest(rest) => pat_names(&rest.arg, names),
        Pat::Assign(assign) => pat_names(&assign.left, names),
        _ => {}
    }
}

/// Local aliases of allow-listed library modules (`import * as Layer from
/// "effect/Layer"` or `import { Layer } from "effect"`)
pub fn module_aliases(module: &Module, profile: &LibraryProfile, modules: &[String]) -> HashSet<String> {
    let submodules: Vec<String> = modules.iter().map(|m| profile.submodule(m)).collect();
    let mut aliases = HashSet::new();

    for import in runtime_imports(module) {
        let source = import_source(import);
        for specifier in &import.specifiers {
            match specifier {
                ImportSpecifier::Namespace(ns) if submodules.contains(&source) => {
                    aliases.insert(ns.local.sym.to_string());
                }
                ImportSpecifier::Named(named)
                    if !named.is_type_only
                        && source == profile.barrel_module
                        && modules.contains(&imported_name(named)) =>
                {
                    aliases.insert(named.local.sym.to_string());
                }
                _ => {}
            }
        }
    }

    aliases
}

/// Index right after the last top-level import, or 0 without imports
pub fn insertion_index(module: &Module) -> usize {
    module
        .body
        .iter()
        .rposition(|item| matches!(item, ModuleItem::ModuleDecl(ModuleDecl::Import(_))))
        .map(|index| index + 1)
        .unwrap_or(0)
}

fn runtime_imports(module: &Module) -> impl Iterator<Item = &ImportDecl> {
    module.body.iter().filter_map(|item| match item {
        ModuleItem::ModuleDecl(ModuleDecl::Import(import)) if !import.type_only => Some(import),
        _ => None,
    })
}

fn import_source(import: &ImportDecl) -> String {
    import.src.value.to_string()
}

fn imported_name(named: &ImportNamedSpecifier) -> String {
    match &named.imported {
        Some(ModuleExportName::Ident(ident)) => ident.sym.to_string(),
        Some(ModuleExportName::Str(name)) => name.value.to_string(),
        None => named.local.sym.to_string(),
    }
}
