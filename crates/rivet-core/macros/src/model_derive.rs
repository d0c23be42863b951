//! Model derive macro
//!
//! Generates the `Model` implementation: cached field metadata plus the
//! shallow conversions to and from an internal value.

use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{Data, DeriveInput, Fields, LitStr, Result, Token, Type};

use crate::crate_paths::get_rivet_core_crate;

/// Model configuration from #[rivet(...)] on the struct
#[derive(Debug, Default)]
struct ModelConfig {
	name: Option<String>,
}

impl ModelConfig {
	fn from_attrs(attrs: &[syn::Attribute]) -> Result<Self> {
		let mut config = Self::default();
		for attr in attrs {
			if !attr.path().is_ident("rivet") {
				continue;
			}
			attr.parse_nested_meta(|meta| {
				if meta.path.is_ident("name") {
					let value: LitStr = meta.value()?.parse()?;
					config.name = Some(value.value());
					Ok(())
				} else {
					Err(meta.error("unsupported rivet model attribute"))
				}
			})?;
		}
		Ok(config)
	}
}

/// How a struct field takes part in the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
	Regular,
	PrimaryKey,
	Relation,
	Embed,
	Skip,
}

/// Field configuration from #[rivet(...)] and #[serde(...)]
#[derive(Debug)]
struct FieldConfig {
	kind: FieldKind,
	rename: Option<String>,
}

impl FieldConfig {
	fn from_attrs(attrs: &[syn::Attribute]) -> Result<Self> {
		let mut kind = FieldKind::Regular;
		let mut rename = None;
		let mut serde_rename = None;
		let mut serde_skip = false;

		for attr in attrs {
			if attr.path().is_ident("rivet") {
				attr.parse_nested_meta(|meta| {
					if meta.path.is_ident("rename") {
						let value: LitStr = meta.value()?.parse()?;
						rename = Some(value.value());
					} else if meta.path.is_ident("relation") {
						kind = FieldKind::Relation;
					} else if meta.path.is_ident("embed") {
						kind = FieldKind::Embed;
					} else if meta.path.is_ident("skip") {
						kind = FieldKind::Skip;
					} else if meta.path.is_ident("primary_key") {
						kind = FieldKind::PrimaryKey;
					} else {
						return Err(meta.error("unsupported rivet field attribute"));
					}
					Ok(())
				})?;
			} else if attr.path().is_ident("serde") {
				attr.parse_nested_meta(|meta| {
					if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
						let value: LitStr = meta.value()?.parse()?;
						serde_rename = Some(value.value());
						Ok(())
					} else if meta.path.is_ident("skip") {
						serde_skip = true;
						Ok(())
					} else {
						skip_value(&meta)
					}
				})?;
			}
		}

		if kind == FieldKind::Regular && serde_skip {
			kind = FieldKind::Skip;
		}
		Ok(Self {
			kind,
			rename: rename.or(serde_rename),
		})
	}
}

/// Consumes the value of a nested meta item we do not interpret.
fn skip_value(meta: &ParseNestedMeta) -> Result<()> {
	if meta.input.peek(Token![=]) {
		let _: syn::Expr = meta.value()?.parse()?;
	} else if meta.input.peek(syn::token::Paren) {
		meta.parse_nested_meta(|nested| skip_value(&nested))?;
	}
	Ok(())
}

fn snake_case(ident: &str) -> String {
	let mut out = String::with_capacity(ident.len() + 4);
	for (i, ch) in ident.chars().enumerate() {
		if ch.is_uppercase() {
			if i > 0 {
				out.push('_');
			}
			out.extend(ch.to_lowercase());
		} else {
			out.push(ch);
		}
	}
	out
}

struct ModelField {
	ident: syn::Ident,
	ty: Type,
	wire_name: String,
	kind: FieldKind,
}

/// Implementation of the Model derive macro
pub(crate) fn derive_model_impl(input: DeriveInput) -> Result<TokenStream> {
	let krate = get_rivet_core_crate()?;
	let struct_name = &input.ident;

	if !input.generics.params.is_empty() {
		return Err(syn::Error::new_spanned(
			&input.generics,
			"Model cannot be derived for generic structs",
		));
	}

	let fields = match &input.data {
		Data::Struct(data) => match &data.fields {
			Fields::Named(named) => &named.named,
			_ => {
				return Err(syn::Error::new_spanned(
					struct_name,
					"Model can only be derived for structs with named fields",
				));
			}
		},
		_ => {
			return Err(syn::Error::new_spanned(
				struct_name,
				"Model can only be derived for structs",
			));
		}
	};

	let config = ModelConfig::from_attrs(&input.attrs)?;
	let model_name = config
		.name
		.unwrap_or_else(|| snake_case(&struct_name.to_string()));

	let mut model_fields = Vec::with_capacity(fields.len());
	for field in fields {
		let Some(ident) = field.ident.clone() else {
			continue;
		};
		let field_config = FieldConfig::from_attrs(&field.attrs)?;
		let raw = ident.to_string();
		let wire_name = field_config
			.rename
			.unwrap_or_else(|| raw.strip_prefix("r#").unwrap_or(&raw).to_string());
		model_fields.push(ModelField {
			ident,
			ty: field.ty.clone(),
			wire_name,
			kind: field_config.kind,
		});
	}

	let meta_calls = model_fields.iter().filter_map(|field| {
		let ty = &field.ty;
		let wire = &field.wire_name;
		let attribute = field.ident.to_string();
		match field.kind {
			FieldKind::Regular => Some(quote!(.field::<#ty>(#attribute, #wire))),
			FieldKind::PrimaryKey => Some(quote!(.primary_key::<#ty>(#attribute, #wire))),
			FieldKind::Relation => Some(quote!(.relation::<#ty>(#attribute, #wire))),
			FieldKind::Embed => Some(quote!(.embed(<#ty as #krate::Model>::meta()))),
			FieldKind::Skip => None,
		}
	});

	// Embedded values go in first so fields of the outer model shadow them.
	let embed_statements = model_fields
		.iter()
		.filter(|field| field.kind == FieldKind::Embed)
		.map(|field| {
			let ident = &field.ident;
			quote! {
				value.extend(#krate::Model::into_internal_value(self.#ident));
			}
		});

	let into_statements = model_fields
		.iter()
		.filter(|field| {
			matches!(
				field.kind,
				FieldKind::Regular | FieldKind::PrimaryKey | FieldKind::Relation
			)
		})
		.map(|field| {
			let ident = &field.ident;
			let wire = &field.wire_name;
			quote! {
				value.insert(
					::std::string::String::from(#wire),
					#krate::FieldType::into_value(self.#ident),
				);
			}
		});

	let from_fields = model_fields.iter().map(|field| {
		let ident = &field.ident;
		let ty = &field.ty;
		let wire = &field.wire_name;
		match field.kind {
			FieldKind::Regular | FieldKind::PrimaryKey | FieldKind::Relation => quote! {
				#ident: #krate::reflect::field_from::<#ty>(value, #wire)?
			},
			FieldKind::Embed => quote! {
				#ident: <#ty as #krate::Model>::from_internal_value(value)?
			},
			FieldKind::Skip => quote! {
				#ident: ::std::default::Default::default()
			},
		}
	});

	Ok(quote! {
		impl #krate::Model for #struct_name {
			fn meta() -> &'static #krate::ModelMeta {
				static META: ::std::sync::OnceLock<#krate::ModelMeta> = ::std::sync::OnceLock::new();
				META.get_or_init(|| {
					#krate::ModelMeta::builder::<Self>(#model_name)
						#(#meta_calls)*
						.build()
				})
			}

			fn into_internal_value(self) -> #krate::InternalValue {
				let mut value = #krate::InternalValue::new();
				#(#embed_statements)*
				#(#into_statements)*
				value
			}

			fn from_internal_value(
				value: &#krate::InternalValue,
			) -> ::std::result::Result<Self, #krate::ConvertError> {
				::std::result::Result::Ok(Self {
					#(#from_fields,)*
				})
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_snake_case() {
		assert_eq!(snake_case("Product"), "product");
		assert_eq!(snake_case("OrderItem"), "order_item");
	}

	#[test]
	fn test_field_config_prefers_rivet_rename() {
		let item: syn::ItemStruct = syn::parse_quote! {
			struct S {
				#[serde(rename = "a", default)]
				#[rivet(rename = "b")]
				x: i64,
			}
		};
		let field = item.fields.iter().next().unwrap();
		let config = FieldConfig::from_attrs(&field.attrs).unwrap();
		assert_eq!(config.rename.as_deref(), Some("b"));
		assert_eq!(config.kind, FieldKind::Regular);
	}

	#[test]
	fn test_field_config_serde_skip() {
		let item: syn::ItemStruct = syn::parse_quote! {
			struct S {
				#[serde(skip, rename(serialize = "s"))]
				cache: String,
			}
		};
		let field = item.fields.iter().next().unwrap();
		let config = FieldConfig::from_attrs(&field.attrs).unwrap();
		assert_eq!(config.kind, FieldKind::Skip);
		assert_eq!(config.rename, None);
	}
}
