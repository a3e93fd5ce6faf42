use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Times a navigation system when the `perf_stats` feature is enabled.
///
/// The wrapped body runs unchanged; a guard created on entry logs the elapsed
/// time when it is dropped. Without `perf_stats` the guard is compiled out.
///
/// If the function takes a parameter named `tick` whose type mentions
/// `NavTick`, the tick number is included in the log line and the timing is
/// also reported every 100 ticks regardless of duration.
///
/// ```ignore
/// #[profile]
/// pub fn drive_navigators(tick: Res<NavTick>, ...) { ... }
///
/// #[profile(4)] // only report runs slower than 4ms
/// pub fn rebuild_obstacle_world(...) { ... }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let label = sig.ident.to_string();

    let tick_param = sig.inputs.iter().find_map(|arg| {
        let FnArg::Typed(pat_type) = arg else {
            return None;
        };
        let Pat::Ident(pat_ident) = &*pat_type.pat else {
            return None;
        };
        let ty = &pat_type.ty;
        let ty_str = quote!(#ty).to_string();
        (pat_ident.ident == "tick" && ty_str.contains("NavTick")).then(|| pat_ident.ident.clone())
    });

    let tick_expr = match tick_param {
        Some(ident) => quote! { Some(#ident.0) },
        None => quote! { None },
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _perf_guard = {
                struct PerfGuard {
                    label: &'static str,
                    started: std::time::Instant,
                    tick: Option<u64>,
                }
                impl Drop for PerfGuard {
                    fn drop(&mut self) {
                        let elapsed = self.started.elapsed();
                        let periodic = self.tick.map_or(false, |t| t % 100 == 0);
                        if elapsed.as_millis() > #threshold_ms || periodic {
                            match self.tick {
                                Some(t) => bevy::prelude::info!(
                                    "[PERF] {} took {:?} (tick {})",
                                    self.label,
                                    elapsed,
                                    t
                                ),
                                None => {
                                    bevy::prelude::info!("[PERF] {} took {:?}", self.label, elapsed)
                                }
                            }
                        }
                    }
                }
                PerfGuard {
                    label: #label,
                    started: std::time::Instant::now(),
                    tick: #tick_expr,
                }
            };

            #block
        }
    };

    output.into()
}
