//! Builtin validation rules. All but `whole_seconds` apply to `String` fields.
use proc_macro2::{Ident, TokenStream};
use quote::quote;

pub(crate) fn dispatch(rule: &str, value: &Ident) -> Option<TokenStream> {
    let ts = match rule {
        "non_empty" => non_empty(value),
        "dn_safe" => dn_safe(value),
        "is_vat_number" => is_vat_number(value),
        "is_amount" => is_amount(value),
        "whole_seconds" => whole_seconds(value),
        _ => return None,
    };
    Some(ts)
}

/// Rules that normalize a non-`String` value instead of checking text.
pub(crate) fn accepts_any_type(rule: &str) -> bool {
    rule == "whole_seconds"
}

fn non_empty(value: &Ident) -> TokenStream {
    quote! {
        if #value.trim().is_empty() {
            return Err(__reject(format!("{} must be non-empty", stringify!(#value))));
        }
    }
}

/// Characters with a meaning in RFC 4514 distinguished names.
fn dn_safe(value: &Ident) -> TokenStream {
    quote! {
        if #value.contains(|c: char| matches!(c, ',' | '=' | '+' | '"' | '\\' | '<' | '>' | ';' | '#')) {
            return Err(__reject(format!(
                "{} must not contain distinguished-name special characters",
                stringify!(#value)
            )));
        }
    }
}

/// VAT registration numbers are exactly 15 digits.
fn is_vat_number(value: &Ident) -> TokenStream {
    quote! {
        if #value.len() != 15 || !#value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(__reject(format!(
                "{} must be a 15 digit VAT registration number",
                stringify!(#value)
            )));
        }
    }
}

/// Plain decimal amount: digits with an optional fractional part.
fn is_amount(value: &Ident) -> TokenStream {
    quote! {
        {
            let mut parts = #value.splitn(2, '.');
            let whole = parts.next().unwrap_or_default();
            let fraction = parts.next();
            let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
            if !digits(whole) || !fraction.map_or(true, digits) {
                return Err(__reject(format!(
                    "{} must be a decimal amount",
                    stringify!(#value)
                )));
            }
        }
    }
}

/// Drops sub-second precision from a `chrono::DateTime`.
fn whole_seconds(value: &Ident) -> TokenStream {
    quote! {
        let #value = ::chrono::SubsecRound::trunc_subsecs(#value, 0);
    }
}
