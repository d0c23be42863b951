//! Helper functions for dynamic crate path resolution using proc_macro_crate

use proc_macro2::TokenStream;
use quote::quote;

/// Resolves the path to the rivet_core crate dynamically.
///
/// Models may depend on `rivet-core` directly or only on the `rivet-web`
/// facade (possibly renamed). Returns an error if neither can be found in
/// Cargo.toml.
pub(crate) fn get_rivet_core_crate() -> syn::Result<TokenStream> {
	use proc_macro_crate::{FoundCrate, crate_name};

	match crate_name("rivet-core") {
		Ok(FoundCrate::Itself) => return Ok(quote!(::rivet_core)),
		Ok(FoundCrate::Name(name)) => {
			let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
			return Ok(quote!(::#ident));
		}
		Err(_) => {}
	}

	match crate_name("rivet-web") {
		Ok(FoundCrate::Itself) => Ok(quote!(::rivet)),
		Ok(FoundCrate::Name(name)) => {
			let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
			Ok(quote!(::#ident))
		}
		Err(e) => Err(syn::Error::new(
			proc_macro2::Span::call_site(),
			format!(
				"failed to resolve `rivet-core` crate: {}. Ensure `rivet-core` or `rivet-web` is listed in Cargo.toml dependencies.",
				e
			),
		)),
	}
}
