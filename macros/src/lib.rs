use proc_macro::{self, TokenStream};
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Fields};

///
/// A derive macro which implements TryFrom<u64> for a fieldless enum with
/// explicit discriminants, plus `as_u64` and `name` helpers.
///
/// Unknown numbers are returned back as the error so callers can build
/// their own error message from them.
///
/// usage:
/// ```rust
/// #[derive(TryFromTag)]
/// pub enum Tag {
///     SpendTx = 12,
/// }
/// ```
///
#[proc_macro_derive(TryFromTag)]
pub fn try_from_tag(input: TokenStream) -> TokenStream {
    let DeriveInput { ident, data, .. } = parse_macro_input!(input);
    let variants = match data {
        Data::Enum(enum_item) => enum_item.variants,
        _ => panic!("TryFromTag only works on Enums"),
    };

    let mut from_arms = vec![];
    let mut to_arms = vec![];
    let mut name_arms = vec![];
    for variant in variants.iter() {
        if !matches!(variant.fields, Fields::Unit) {
            panic!("TryFromTag only works on fieldless variants");
        }
        let discriminant: &Expr = match &variant.discriminant {
            Some((_, expr)) => expr,
            None => panic!("TryFromTag needs an explicit discriminant on every variant"),
        };
        let variant_ident = &variant.ident;
        let variant_name = variant_ident.to_string();
        from_arms.push(quote! { #discriminant => Ok(#ident::#variant_ident), });
        to_arms.push(quote! { #ident::#variant_ident => #discriminant, });
        name_arms.push(quote! { #ident::#variant_ident => #variant_name, });
    }

    let output = quote! {
        impl std::convert::TryFrom<u64> for #ident {
            type Error = u64;
            fn try_from(x: u64) -> std::result::Result<Self, Self::Error> {
                match x {
                    #(#from_arms)*
                    _ => Err(x),
                }
            }
        }

        impl #ident {
            pub fn as_u64(&self) -> u64 {
                match self {
                    #(#to_arms)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }
        }
    };
    output.into()
}
