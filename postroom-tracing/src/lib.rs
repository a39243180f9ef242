#![warn(clippy::pedantic)]

//! `#[traced]`: enter/exit trace events for postroom entry points.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "us"))]
//! pub async fn service(&self, envelope: Envelope) -> Result<ServiceReport, ProcessorError> {
//!     ...
//! }
//! ```
//!
//! The expansion references `tracing::` paths, so the calling crate must have
//! `tracing` available under that name.

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{Block, Expr, ItemFn, Stmt, parse::Parse, parse_macro_input, parse_quote};

/// Resolution of the elapsed time reported in the exit event.
#[derive(PartialEq, Eq, Clone, Copy, Default)]
enum Unit {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Unit {
    /// Closure expression turning a `Duration` into the rendered elapsed time.
    fn formatter(self) -> syn::Expr {
        match self {
            Self::Nanos => {
                parse_quote!(|d: std::time::Duration| format!("{} ns elapsed", d.as_nanos()))
            }
            Self::Micros => {
                parse_quote!(|d: std::time::Duration| format!("{} us elapsed", d.as_micros()))
            }
            Self::Millis => {
                parse_quote!(|d: std::time::Duration| format!("{} ms elapsed", d.as_millis()))
            }
            Self::Seconds => {
                parse_quote!(|d: std::time::Duration| format!("{} s elapsed", d.as_secs()))
            }
        }
    }
}

impl From<&str> for Unit {
    fn from(value: &str) -> Self {
        match value {
            "us" | "micro" | "micros" | "microseconds" => Self::Micros,
            "ms" | "milli" | "millis" | "milliseconds" => Self::Millis,
            "s" | "sec" | "secs" | "seconds" => Self::Seconds,
            _ => Self::Nanos,
        }
    }
}

impl Parse for Unit {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if !input.peek(syn::token::Paren) {
            return Ok(Self::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let unit = content.parse::<syn::LitStr>()?.value();

        Ok(Self::from(unit.as_str()))
    }
}

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
}

#[derive(Default)]
struct Arguments {
    timing: Option<Unit>,
    instrument: Option<TokenStream>,
    unrecognised: Vec<syn::Error>,
}

impl Arguments {
    /// Unknown arguments become deprecation warnings instead of hard errors.
    fn warnings(&self) -> TokenStream {
        let warnings = self.unrecognised.iter().map(|err| {
            let msg = syn::LitStr::new(&format!("found unrecognized input, {err}"), err.span());

            quote_spanned! {err.span()=>
                #[warn(deprecated)]
                {
                    #[deprecated(since = "not actually deprecated", note = #msg)]
                    const TRACED_ARGUMENT_WARNING: () = ();
                    let _ = TRACED_ARGUMENT_WARNING;
                }
            }
        });

        quote! {
            { #(#warnings)* }
        }
    }
}

impl Parse for Arguments {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut arguments = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                if arguments.timing.is_some() {
                    return Err(input.error("expected at most one `timing` argument"));
                }

                let _ = input.parse::<keywords::timing>()?;
                arguments.timing = Some(input.parse()?);
            } else if lookahead.peek(keywords::instrument) {
                if arguments.instrument.is_some() {
                    return Err(input.error("expected at most one `instrument` argument"));
                }

                let _ = input.parse::<keywords::instrument>()?;
                if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    arguments.instrument = Some(content.parse()?);
                } else {
                    arguments.instrument = Some(TokenStream::new());
                }
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                arguments.unrecognised.push(lookahead.error());
                let _ = input.parse::<proc_macro2::TokenTree>();
            }
        }

        Ok(arguments)
    }
}

/// Emits `tracing::trace!` events when the attributed function is entered and
/// when it returns (including early returns and unwinding), optionally adding
/// `#[tracing::instrument(...)]` and the elapsed time.
///
/// # Panics
///
/// When applied to anything other than a function.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Arguments);
    let warnings = args.warnings();

    let mut item_fn = parse_macro_input!(item as ItemFn);

    item_fn
        .attrs
        .push(parse_quote! { #[allow(clippy::items_after_statements)] });

    if let Some(fields) = args.instrument {
        item_fn
            .attrs
            .push(parse_quote! { #[tracing::instrument(#fields)] });
    }

    let name = item_fn.sig.ident.to_string();
    let on_exit: Stmt = match args.timing {
        None => parse_quote! { tracing::trace!("OnExit: {}", #name); },
        Some(unit) => {
            let formatter = unit.formatter();
            parse_quote! {
                tracing::trace!("OnExit: {} ({})", #name, (#formatter)(self.started.elapsed()));
            }
        }
    };

    let guard: Vec<Stmt> = parse_quote! {
        #[allow(dead_code)]
        struct __TracedGuard {
            started: std::time::Instant,
        }

        impl __TracedGuard {
            fn enter() -> Self {
                #warnings

                tracing::trace!("OnEnter: {}", #name);
                Self {
                    started: std::time::Instant::now(),
                }
            }
        }

        impl std::ops::Drop for __TracedGuard {
            fn drop(&mut self) {
                #on_exit
            }
        }

        let __traced_guard = __TracedGuard::enter();
    };

    if let Some(future) = async_trait_body(&mut item_fn.block) {
        future.stmts.splice(0..0, guard);
    } else {
        item_fn.block.stmts.splice(0..0, guard);
    }

    quote! { #item_fn }.into()
}

/// `#[async_trait]` expands first, leaving a sync function whose body ends in
/// `Box::pin(async move { .. })`. The guard belongs inside that future, so
/// the exit event fires when it completes rather than when it is built.
fn async_trait_body(block: &mut Block) -> Option<&mut Block> {
    let Some(Stmt::Expr(Expr::Call(call), None)) = block.stmts.last_mut() else {
        return None;
    };

    let Expr::Path(func) = call.func.as_ref() else {
        return None;
    };
    let segments: Vec<String> = func
        .path
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    if !segments.ends_with(&["Box".to_string(), "pin".to_string()]) || call.args.len() != 1 {
        return None;
    }

    match call.args.first_mut() {
        Some(Expr::Async(future)) => Some(&mut future.block),
        _ => None,
    }
}
