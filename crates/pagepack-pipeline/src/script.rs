//! Script analysis and rewriting into registry modules.
//!
//! ES module syntax is parsed with oxc and rewritten in place through small,
//! non-overlapping text edits, so the rest of each module is emitted byte for
//! byte. CommonJS `require("...")` calls are found textually.

use std::collections::HashMap;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, Declaration, ExportDefaultDeclarationKind, Expression,
    IdentifierReference, ImportDeclarationSpecifier, ModuleDeclaration, ModuleExportName,
    StaticMemberExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType};

use crate::traits::PipelineError;

/// One binding introduced by an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    /// `import local from "..."`
    Default(String),
    /// `import * as local from "..."`
    Namespace(String),
    /// `import { imported as local } from "..."`
    Named { imported: String, local: String },
}

/// What a dependency statement does with the module it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
    /// `import ... from "..."`, or a bare `import "..."` when empty
    Import(Vec<ImportBinding>),
    /// `export { local as exported } from "..."`
    ReExport(Vec<(String, String)>),
    /// `export * from "..."`, or `export * as name from "..."`
    ReExportAll(Option<String>),
    /// `require("...")`
    Require,
}

/// A reference to another module found in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub specifier: String,
    pub kind: DependencyKind,
    /// Byte range replaced when the dependency is rewritten
    pub start: usize,
    pub end: usize,
}

/// Export syntax that needs rewriting but names no other module.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExportEdit {
    /// `export <declaration>`: drop the keyword, assign names after it
    Declaration {
        keyword: (usize, usize),
        end: usize,
        names: Vec<String>,
    },
    /// `export default <named function or class>`
    DefaultNamed {
        keyword: (usize, usize),
        end: usize,
        name: String,
    },
    /// `export default <expression>`
    DefaultExpression {
        keyword: (usize, usize),
        tail: (usize, usize),
    },
    /// `export { a, b as c }`: removed, assignments appended to the module
    Local {
        span: (usize, usize),
        specifiers: Vec<(String, String)>,
    },
}

/// Module syntax found in one script.
#[derive(Debug, Clone, Default)]
pub struct ScriptSyntax {
    pub dependencies: Vec<Dependency>,
    exports: Vec<ExportEdit>,
    /// Byte ranges of `process.env.NODE_ENV` reads
    node_env: Vec<(usize, usize)>,
    /// Whether the file uses ES module syntax
    pub is_esm: bool,
}

/// How a resolved dependency is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyTarget {
    /// A registry module with this id
    Module(String),
    /// Extracted elsewhere; the statement is dropped
    Removed,
}

/// Parse a script and collect its module syntax.
pub fn scan(source: &str, path: &Path) -> Result<ScriptSyntax, PipelineError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());

    let ret = Parser::new(&allocator, source, source_type).parse();
    if let Some(error) = ret.errors.first() {
        return Err(PipelineError::ScriptSyntax {
            path: path.display().to_string(),
            message: error.to_string(),
        });
    }

    let mut syntax = ScriptSyntax::default();

    for stmt in &ret.program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };
        syntax.is_esm = true;

        match decl {
            ModuleDeclaration::ImportDeclaration(import) => {
                let bindings = import
                    .specifiers
                    .as_ref()
                    .map(|specs| {
                        specs
                            .iter()
                            .map(|spec| match spec {
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                    ImportBinding::Default(s.local.name.to_string())
                                }
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    ImportBinding::Namespace(s.local.name.to_string())
                                }
                                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                    ImportBinding::Named {
                                        imported: export_name(&s.imported),
                                        local: s.local.name.to_string(),
                                    }
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                syntax.dependencies.push(Dependency {
                    specifier: import.source.value.to_string(),
                    kind: DependencyKind::Import(bindings),
                    start: import.span.start as usize,
                    end: import.span.end as usize,
                });
            }

            ModuleDeclaration::ExportNamedDeclaration(named) => {
                let start = named.span.start as usize;
                let end = named.span.end as usize;

                if let Some(src) = &named.source {
                    let specifiers = named
                        .specifiers
                        .iter()
                        .map(|s| (export_name(&s.local), export_name(&s.exported)))
                        .collect();
                    syntax.dependencies.push(Dependency {
                        specifier: src.value.to_string(),
                        kind: DependencyKind::ReExport(specifiers),
                        start,
                        end,
                    });
                } else if let Some(declaration) = &named.declaration {
                    syntax.exports.push(ExportEdit::Declaration {
                        keyword: (start, declaration.span().start as usize),
                        end,
                        names: declared_names(declaration),
                    });
                } else {
                    let specifiers = named
                        .specifiers
                        .iter()
                        .map(|s| (export_name(&s.local), export_name(&s.exported)))
                        .collect();
                    syntax.exports.push(ExportEdit::Local {
                        span: (start, end),
                        specifiers,
                    });
                }
            }

            ModuleDeclaration::ExportDefaultDeclaration(export) => {
                let start = export.span.start as usize;
                let end = export.span.end as usize;
                let inner = export.declaration.span();
                let keyword = (start, inner.start as usize);

                let name = match &export.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        func.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        class.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };

                syntax.exports.push(match name {
                    Some(name) => ExportEdit::DefaultNamed { keyword, end, name },
                    None => ExportEdit::DefaultExpression {
                        keyword,
                        tail: (inner.end as usize, end),
                    },
                });
            }

            ModuleDeclaration::ExportAllDeclaration(all) => {
                syntax.dependencies.push(Dependency {
                    specifier: all.source.value.to_string(),
                    kind: DependencyKind::ReExportAll(all.exported.as_ref().map(export_name)),
                    start: all.span.start as usize,
                    end: all.span.end as usize,
                });
            }

            _ => {}
        }
    }

    let scoping = SemanticBuilder::new()
        .build(&ret.program)
        .semantic
        .into_scoping();
    let mut commonjs = CommonJsScan {
        scoping: &scoping,
        requires: Vec::new(),
        node_env: Vec::new(),
    };
    commonjs.visit_program(&ret.program);

    syntax.dependencies.extend(commonjs.requires);
    syntax.node_env = commonjs.node_env;
    syntax.dependencies.sort_by_key(|d| d.start);

    Ok(syntax)
}

/// Collects `require("...")` calls on the global `require` and
/// `process.env.NODE_ENV` reads.
struct CommonJsScan<'s> {
    scoping: &'s Scoping,
    requires: Vec<Dependency>,
    node_env: Vec<(usize, usize)>,
}

impl CommonJsScan<'_> {
    fn is_global(&self, ident: &IdentifierReference) -> bool {
        match ident.reference_id.get() {
            Some(id) => self.scoping.get_reference(id).symbol_id().is_none(),
            None => true,
        }
    }

    fn required_specifier(&self, call: &CallExpression) -> Option<String> {
        let Expression::Identifier(callee) = &call.callee else {
            return None;
        };
        if callee.name != "require" || !self.is_global(callee) {
            return None;
        }
        match call.arguments.as_slice() {
            [Argument::StringLiteral(lit)] => Some(lit.value.to_string()),
            _ => None,
        }
    }

    fn is_node_env(&self, member: &StaticMemberExpression) -> bool {
        if member.property.name != "NODE_ENV" {
            return false;
        }
        let Expression::StaticMemberExpression(env) = &member.object else {
            return false;
        };
        if env.property.name != "env" {
            return false;
        }
        match &env.object {
            Expression::Identifier(process) => process.name == "process" && self.is_global(process),
            _ => false,
        }
    }
}

impl<'a> Visit<'a> for CommonJsScan<'_> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(specifier) = self.required_specifier(it) {
            self.requires.push(Dependency {
                specifier,
                kind: DependencyKind::Require,
                start: it.span.start as usize,
                end: it.span.end as usize,
            });
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if self.is_node_env(it) {
            self.node_env.push((it.span.start as usize, it.span.end as usize));
            return;
        }
        walk::walk_static_member_expression(self, it);
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Rewrite a scanned script into the body of a registry module.
///
/// `targets` maps each dependency specifier to what it resolved to; a
/// `require` with no target is left as written. `mode` replaces
/// `process.env.NODE_ENV`.
pub fn rewrite(
    source: &str,
    syntax: &ScriptSyntax,
    targets: &HashMap<String, DependencyTarget>,
    mode: &str,
) -> String {
    let mut edits: Vec<Edit> = Vec::new();
    let mut trailer: Vec<String> = Vec::new();

    for (index, dep) in syntax.dependencies.iter().enumerate() {
        let target = targets.get(&dep.specifier);
        let text = match (target, &dep.kind) {
            (None, DependencyKind::Require) => continue,
            (None, _) | (Some(DependencyTarget::Removed), _) => String::new(),
            (Some(DependencyTarget::Module(id)), kind) => {
                render_dependency(kind, &quote(id), index, &mut trailer)
            }
        };
        edits.push(Edit {
            start: dep.start,
            end: dep.end,
            text,
        });
    }

    for export in &syntax.exports {
        match export {
            ExportEdit::Declaration {
                keyword,
                end,
                names,
            } => {
                edits.push(Edit {
                    start: keyword.0,
                    end: keyword.1,
                    text: String::new(),
                });
                let assignments: String = names
                    .iter()
                    .map(|n| format!("\nexports.{} = {};", n, n))
                    .collect();
                edits.push(Edit {
                    start: *end,
                    end: *end,
                    text: assignments,
                });
            }
            ExportEdit::DefaultNamed { keyword, end, name } => {
                edits.push(Edit {
                    start: keyword.0,
                    end: keyword.1,
                    text: String::new(),
                });
                edits.push(Edit {
                    start: *end,
                    end: *end,
                    text: format!("\nexports.default = {};", name),
                });
            }
            ExportEdit::DefaultExpression { keyword, tail } => {
                edits.push(Edit {
                    start: keyword.0,
                    end: keyword.1,
                    text: "exports.default = (".to_string(),
                });
                edits.push(Edit {
                    start: tail.0,
                    end: tail.1,
                    text: ");".to_string(),
                });
            }
            ExportEdit::Local { span, specifiers } => {
                edits.push(Edit {
                    start: span.0,
                    end: span.1,
                    text: String::new(),
                });
                for (local, exported) in specifiers {
                    trailer.push(format!("exports[{}] = {};", quote(exported), local));
                }
            }
        }
    }

    for &(start, end) in &syntax.node_env {
        edits.push(Edit {
            start,
            end,
            text: quote(mode),
        });
    }

    edits.sort_by_key(|e| (e.start, e.end));

    let mut out = String::with_capacity(source.len() + 256);
    if syntax.is_esm {
        out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
    }

    let mut cursor = 0;
    for edit in edits {
        // A statement rewritten as a whole wins over edits nested in it
        if edit.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);

    if !trailer.is_empty() {
        out.push('\n');
        out.push_str(&trailer.join("\n"));
    }

    out
}

fn render_dependency(
    kind: &DependencyKind,
    id: &str,
    index: usize,
    trailer: &mut Vec<String>,
) -> String {
    let var = format!("__pagepack_import_{}", index);

    match kind {
        DependencyKind::Require => format!("require({})", id),

        DependencyKind::Import(bindings) if bindings.is_empty() => format!("require({});", id),

        DependencyKind::Import(bindings) => {
            let mut out = format!("var {} = require({});", var, id);
            for binding in bindings {
                let line = match binding {
                    ImportBinding::Default(local) => {
                        format!(" var {} = require.interop({});", local, var)
                    }
                    ImportBinding::Namespace(local) => format!(" var {} = {};", local, var),
                    ImportBinding::Named { imported, local } if imported == "default" => {
                        format!(" var {} = require.interop({});", local, var)
                    }
                    ImportBinding::Named { imported, local } => {
                        format!(" var {} = {}[{}];", local, var, quote(imported))
                    }
                };
                out.push_str(&line);
            }
            out
        }

        DependencyKind::ReExport(specifiers) => {
            let out = format!("var {} = require({});", var, id);
            for (local, exported) in specifiers {
                let value = if local == "default" {
                    format!("require.interop({})", var)
                } else {
                    format!("{}[{}]", var, quote(local))
                };
                trailer.push(format!("exports[{}] = {};", quote(exported), value));
            }
            out
        }

        DependencyKind::ReExportAll(None) => {
            format!("require.reexport(exports, require({}));", id)
        }

        DependencyKind::ReExportAll(Some(name)) => {
            format!("exports[{}] = require({});", quote(name), id)
        }
    }
}

/// JSON string literal, valid as a JavaScript string.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
