//! JavaScript minification via oxc.

use cache_minify::{JsMinifier, MinifyError};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::minifier::{Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

/// Compresses and mangles scripts with the oxc minifier.
///
/// Scripts are parsed as classic scripts first and as ES modules if that
/// fails, so inline `import` statements still minify.
#[derive(Debug, Clone, Copy, Default)]
pub struct OxcJs;

impl JsMinifier for OxcJs {
    fn minify_js(&self, js: &str) -> Result<String, MinifyError> {
        match minify_as(js, SourceType::cjs()) {
            Ok(code) => Ok(code),
            Err(script_err) => minify_as(js, SourceType::mjs()).map_err(|_| script_err),
        }
    }
}

fn minify_as(js: &str, source_type: SourceType) -> Result<String, MinifyError> {
    let allocator = Allocator::default();
    let parser_result = Parser::new(&allocator, js, source_type).parse();

    if parser_result.panicked || !parser_result.errors.is_empty() {
        let first_error = parser_result
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser panicked".to_string());
        return Err(MinifyError::new("js", first_error));
    }

    let mut program = parser_result.program;
    let minified = Minifier::new(MinifierOptions::default()).minify(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(minified.scoping)
        .build(&program)
        .code;
    Ok(code)
}
