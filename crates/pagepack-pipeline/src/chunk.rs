//! Chunk rendering: the module registry runtime and output filenames.

use crate::assets::short_hash;
use crate::graph::Module;

/// Chunk holding the entry and everything outside `node_modules`.
pub const MAIN_CHUNK: &str = "main";

/// Chunk holding `node_modules` code when chunks are split.
pub const VENDOR_CHUNK: &str = "vendors~main";

/// Global every chunk registers its module factories on.
const REGISTRY: &str = "self.__pagepack_modules";

const RUNTIME: &str = r#"var __pagepack_cache = {};
function require(id) {
  var cached = __pagepack_cache[id];
  if (cached) return cached.exports;
  var factory = __pagepack_registry[id];
  if (!factory) throw new Error("Cannot find module '" + id + "'");
  var module = (__pagepack_cache[id] = { exports: {} });
  factory.call(module.exports, module, module.exports, require);
  return module.exports;
}
require.interop = function (exports) {
  return exports && exports.__esModule ? exports.default : exports;
};
require.reexport = function (target, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || key === "__esModule" || key in target) return;
    Object.defineProperty(target, key, {
      enumerable: true,
      get: function () { return source[key]; }
    });
  });
};
"#;

/// Render the chunk that carries the runtime and starts the entry module.
pub fn render_main_chunk(modules: &[&Module], entry: &str) -> String {
    let mut out = String::from("(function () {\n");
    out.push_str(&format!(
        "var __pagepack_registry = ({0} = {0} || {{}});\n",
        REGISTRY
    ));
    push_modules(&mut out, modules);
    out.push_str(RUNTIME);
    out.push_str(&format!("require({});\n", quote(entry)));
    out.push_str("})();\n");
    out
}

/// Render a chunk that only registers its modules.
///
/// Loaded before the main chunk, so the runtime finds the factories when the
/// entry starts.
pub fn render_module_chunk(modules: &[&Module]) -> String {
    let mut out = String::from("(function () {\n");
    out.push_str(&format!(
        "var __pagepack_registry = ({0} = {0} || {{}});\n",
        REGISTRY
    ));
    push_modules(&mut out, modules);
    out.push_str("})();\n");
    out
}

fn push_modules(out: &mut String, modules: &[&Module]) {
    for module in modules {
        out.push_str(&format!(
            "__pagepack_registry[{}] = function (module, exports, require) {{\n",
            quote(&module.id)
        ));
        out.push_str(&module.code);
        if !module.code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("};\n");
    }
}

/// Render an output filename template.
///
/// Supports `[name]` and `[contenthash]` (8 hex digits of the contents).
pub fn render_filename(template: &str, name: &str, contents: &[u8]) -> String {
    let mut rendered = template.replace("[name]", name);
    if rendered.contains("[contenthash]") {
        rendered = rendered.replace("[contenthash]", &short_hash(contents));
    }
    rendered
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleKind;
    use std::path::PathBuf;

    fn module(id: &str, code: &str) -> Module {
        Module {
            id: id.to_string(),
            path: PathBuf::from(id),
            kind: ModuleKind::Script,
            vendor: false,
            code: code.to_string(),
        }
    }

    #[test]
    fn main_chunk_registers_and_starts_entry() {
        let entry = module("./src/index.js", "console.log(1);");
        let out = render_main_chunk(&[&entry], "./src/index.js");

        assert!(out.contains("__pagepack_registry[\"./src/index.js\"] = function (module, exports, require) {\nconsole.log(1);\n};"));
        assert!(out.contains("require.interop"));
        assert!(out.trim_end().ends_with("require(\"./src/index.js\");\n})();"));
    }

    #[test]
    fn module_chunk_has_no_runtime() {
        let vendor = module("./node_modules/a/index.js", "module.exports = 1;\n");
        let out = render_module_chunk(&[&vendor]);

        assert!(out.contains("./node_modules/a/index.js"));
        assert!(!out.contains("require.interop"));
        assert!(out.contains("self.__pagepack_modules = self.__pagepack_modules || {}"));
    }

    #[test]
    fn renders_filenames() {
        assert_eq!(render_filename("[name].js", "main", b"x"), "main.js");
        assert_eq!(
            render_filename("js/[name].js", "vendors~main", b"x"),
            "js/vendors~main.js"
        );

        let hashed = render_filename("[name].[contenthash].css", "main", b"body{}");
        assert!(hashed.starts_with("main."));
        assert_eq!(hashed.len(), "main.".len() + 8 + ".css".len());
        assert_ne!(hashed, render_filename("[name].[contenthash].css", "main", b"p{}"));
    }
}
