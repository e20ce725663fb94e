use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input,
    spanned::Spanned,
    BinOp, Block, Error, Expr, ExprLit, Ident, Pat, Stmt, Token, UnOp,
};

/// `tape, { statements }`
struct TapeBlock {
    tape: Expr,
    block: Block,
}

impl Parse for TapeBlock {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let tape = input.parse()?;
        input.parse::<Token![,]>()?;
        let block = input.parse()?;
        Ok(Self { tape, block })
    }
}

/// Records the `let` statements of a block on a tape.
///
/// ```ignore
/// let tape = Tape::new();
/// tapegrad!(tape, {
///     let x = 3.;
///     let y = relu(2. * x - 1.) + pow(x, 2.);
/// });
/// y.backward();
/// ```
///
/// Literals bound by `let` become leaves named after the variable. Supported
/// expressions are `+ - * /`, unary `-`, parentheses, variables, literals,
/// `relu(e)` and `pow(e, p)`.
#[proc_macro]
pub fn tapegrad(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let TapeBlock { tape, block } = parse_macro_input!(input as TapeBlock);

    let tape_name = Ident::new("_tape", Span::call_site());
    let mut objs = vec![quote! {
        let #tape_name = &#tape;
    }];

    for stmt in &block.stmts {
        if let Err(e) = traverse_stmt(stmt, &tape_name, &mut objs) {
            return e.to_compile_error().into();
        }
    }

    // Build the output, possibly using quasi-quotation
    let expanded = quote! {
        #(#objs)*
    };

    // Hand the output tokens back to the compiler
    TokenStream::from(expanded)
}

fn traverse_stmt(input: &Stmt, tape: &Ident, terms: &mut Vec<TokenStream2>) -> syn::Result<()> {
    match input {
        Stmt::Local(local) => {
            let (Pat::Ident(id), Some(init)) = (&local.pat, &local.init) else {
                return Err(Error::new(
                    local.span(),
                    "expected `let <name> = <expression>;`",
                ));
            };
            let name = id.ident.clone();
            let ts = match &*init.expr {
                Expr::Lit(lit) => quote! {
                    let #name = #tape.term(stringify!(#name), #lit as f64);
                },
                Expr::Unary(ex) if matches!(ex.op, UnOp::Neg(_)) && is_lit(&ex.expr) => {
                    let lit = &ex.expr;
                    quote! {
                        let #name = #tape.term(stringify!(#name), -(#lit as f64));
                    }
                }
                Expr::Path(path) => quote! {
                    let #name = #path;
                },
                ex => {
                    let res = traverse_expr(ex, tape, terms)?;
                    quote! {
                        let #name = #res;
                    }
                }
            };
            terms.push(ts);
        }
        Stmt::Expr(ex, _) => {
            traverse_expr(ex, tape, terms)?;
        }
        _ => (),
    }
    Ok(())
}

fn is_lit(ex: &Expr) -> bool {
    matches!(ex, Expr::Lit(_))
}

fn var_name(terms: &[TokenStream2]) -> String {
    format!("_a{}", terms.len())
}

fn format_term(ex: &ExprLit, tape: &Ident, terms: &mut Vec<TokenStream2>) -> Ident {
    let name = Ident::new(&var_name(terms), ex.span());
    let ts = quote! {
        let #name = #tape.term(stringify!(#name), #ex as f64);
    };
    terms.push(ts);
    name
}

fn traverse_expr(input: &Expr, tape: &Ident, terms: &mut Vec<TokenStream2>) -> syn::Result<Ident> {
    match input {
        Expr::Binary(ex) => {
            let lhs = traverse_expr(&ex.left, tape, terms)?;
            let rhs = traverse_expr(&ex.right, tape, terms)?;
            let name = Ident::new(&var_name(terms), ex.span());
            let binop = match ex.op {
                BinOp::Add(_) => quote! { #lhs + #rhs },
                BinOp::Sub(_) => quote! { #lhs - #rhs },
                BinOp::Mul(_) => quote! { #lhs * #rhs },
                BinOp::Div(_) => quote! { #lhs / #rhs },
                _ => return Err(Error::new(ex.op.span(), "unsupported binary operator")),
            };
            terms.push(quote! {
                let #name = #binop;
            });
            Ok(name)
        }
        Expr::Unary(ex) => {
            if !matches!(ex.op, UnOp::Neg(_)) {
                return Err(Error::new(ex.op.span(), "unsupported unary operator"));
            }
            let term = traverse_expr(&ex.expr, tape, terms)?;
            let name = Ident::new(&var_name(terms), ex.span());
            terms.push(quote! {
                let #name = -#term;
            });
            Ok(name)
        }
        Expr::Paren(ex) => traverse_expr(&ex.expr, tape, terms),
        Expr::Lit(lit) => Ok(format_term(lit, tape, terms)),
        Expr::Path(path) => path
            .path
            .get_ident()
            .cloned()
            .ok_or_else(|| Error::new(path.span(), "expected a variable name")),
        Expr::Call(call) => {
            let func = match &*call.func {
                Expr::Path(func) => func.path.get_ident().map(|id| id.to_string()),
                _ => None,
            };
            let mut args = call.args.iter();
            let Some(arg) = args.next() else {
                return Err(Error::new(call.span(), "expected an argument"));
            };
            let arg = traverse_expr(arg, tape, terms)?;
            let name = Ident::new(&var_name(terms), call.span());
            let ts = match (func.as_deref(), args.next(), args.next()) {
                (Some("relu"), None, None) => quote! {
                    let #name = #arg.relu();
                },
                (Some("pow"), Some(exponent), None) => quote! {
                    let #name = #arg.pow((#exponent) as f64);
                },
                _ => {
                    return Err(Error::new(
                        call.func.span(),
                        "supported functions are `relu(x)` and `pow(x, p)`",
                    ))
                }
            };
            terms.push(ts);
            Ok(name)
        }
        _ => Err(Error::new(input.span(), "unsupported expression")),
    }
}
