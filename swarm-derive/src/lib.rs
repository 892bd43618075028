//! Derive macros for swarm kernel parameter contracts.
//!
//! This crate provides one derive macro:
//!
//! - [`ParamContract`] - Maps a Rust struct onto a kernel's uniform struct by name
//!
//! # Usage
//!
//! The macro is re-exported from the main `swarm` crate. You don't need
//! to add this crate directly:
//!
//! ```ignore
//! use swarm::prelude::*;
//!
//! #[derive(ParamContract, Clone, Copy)]
//! struct Wind {
//!     direction: Vec3,
//!     strength: f32,
//!     #[param(rename = "gust_on")]
//!     gusting: bool,
//! }
//! ```
//!
//! # Naming
//!
//! Field names are converted to camelCase to form the logical parameter name
//! the kernel must declare (`delta_time` → `deltaTime`,
//! `attractor1_position` → `attractor1Position`). `#[param(rename = "...")]`
//! overrides the generated name.
//!
//! # Supported Types
//!
//! | Rust Type | WGSL Type |
//! |-----------|-----------|
//! | `f32` | `f32` |
//! | `u32` | `u32` |
//! | `i32` | `i32` |
//! | `bool` | `u32` (0 or 1) |
//! | `Vec2` | `vec2<f32>` |
//! | `Vec3` | `vec3<f32>` |
//! | `Vec4` | `vec4<f32>` |
//! | `Mat4` | `mat4x4<f32>` |
//!
//! `bool` travels as `u32` because WGSL does not allow `bool` in uniform
//! buffers.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr, Type};

/// Derive macro for kernel parameter contracts.
///
/// # Generated Items
///
/// For a struct `Wind`:
///
/// - `impl swarm::ParamContract for Wind`
/// - `Wind::NAMES` - logical parameter names in field order
/// - `Wind::WGSL_STRUCT` - a WGSL `struct Wind { ... }` declaration with
///   those names, ready to prepend to a kernel
/// - `write_params` - writes every field into a `ParamBlock` by name
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to an enum, union, or tuple struct
/// - A field has an unsupported type
/// - A `#[param(...)]` attribute is malformed
#[proc_macro_derive(ParamContract, attributes(param))]
pub fn derive_param_contract(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("ParamContract derive only supports structs with named fields"),
        },
        _ => panic!("ParamContract derive only supports structs"),
    };

    let mut param_names = Vec::new();
    let mut wgsl_fields = Vec::new();
    let mut writes = Vec::new();

    for field in fields.iter() {
        let field_ident = field
            .ident
            .as_ref()
            .expect("named fields always carry an identifier");
        let field_name = field_ident.to_string();

        let mut rename: Option<String> = None;
        for attr in &field.attrs {
            if attr.path().is_ident("param") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        let value: LitStr = meta.value()?.parse()?;
                        rename = Some(value.value());
                        Ok(())
                    } else {
                        Err(meta.error("expected `rename = \"...\"`"))
                    }
                })
                .unwrap_or_else(|e| panic!("invalid #[param] on '{}': {}", field_name, e));
            }
        }

        let param_name = rename.unwrap_or_else(|| camel_case(&field_name));
        let wgsl_type = wgsl_type_for(&field.ty).unwrap_or_else(|| {
            panic!(
                "ParamContract field '{}' has an unsupported type; use f32, u32, i32, bool, Vec2, Vec3, Vec4 or Mat4",
                field_name
            )
        });

        wgsl_fields.push(format!("    {}: {},", param_name, wgsl_type));
        writes.push(quote! {
            let _ = block.set(#param_name, self.#field_ident);
        });
        param_names.push(param_name);
    }

    let wgsl_struct = format!("struct {} {{\n{}\n}};\n", name, wgsl_fields.join("\n"));

    let expanded = quote! {
        impl swarm::ParamContract for #name {
            const NAMES: &'static [&'static str] = &[#(#param_names),*];
            const WGSL_STRUCT: &'static str = #wgsl_struct;

            fn write_params(&self, block: &mut swarm::ParamBlock) {
                #(#writes)*
            }
        }
    };

    TokenStream::from(expanded)
}

/// `snake_case` → `camelCase`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.trim_start_matches('_').chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn wgsl_type_for(ty: &Type) -> Option<&'static str> {
    let Type::Path(path) = ty else {
        return None;
    };
    let ident = path.path.segments.last()?.ident.to_string();
    match ident.as_str() {
        "f32" => Some("f32"),
        "u32" => Some("u32"),
        "i32" => Some("i32"),
        "bool" => Some("u32"),
        "Vec2" => Some("vec2<f32>"),
        "Vec3" => Some("vec3<f32>"),
        "Vec4" => Some("vec4<f32>"),
        "Mat4" => Some("mat4x4<f32>"),
        _ => None,
    }
}
