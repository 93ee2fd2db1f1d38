//! Call-site discovery.
//!
//! A call site is a `call`/`callvirt` to a registered decrypter whose arguments are all
//! pushed by constant loads immediately in front of it, within the same block:
//!
//! ```text
//! ldc.i4.s  42          <- start
//! ldstr     "key"
//! call      string Crypto.Strings::Get(int32, string)   <- call
//! ```
//!
//! Scanning only records sites; nothing is rewritten until every site of the method has
//! been resolved.

use crate::{
    assembly::{Block, Instruction, OpCode},
    deobfuscation::{constant::ConstValue, registry::DecrypterRegistry},
    metadata::{
        module::ModuleDef,
        signature::{MemberSig, TypeSig},
        token::Token,
    },
    resolver::{ResolvedMethod, ResolvedModule, ResolverContext},
    Error, Result,
};

/// One decrypter invocation found in a method body.
#[derive(Debug, Clone)]
pub struct CallSite<E> {
    /// Index of the owning block
    pub block: usize,
    /// Index of the first argument load within the block
    pub start: usize,
    /// Index of the call instruction within the block
    pub call: usize,
    /// The call's method token as written in the caller
    pub target: Token,
    /// The resolved decrypter
    pub method: ResolvedMethod,
    /// The registry entry of the decrypter
    pub decrypter: E,
    /// Constant arguments, in parameter order
    pub args: Vec<ConstValue>,
    /// The decrypted result, once computed
    pub value: Option<ConstValue>,
}

/// Call sites of one method and the number of decrypter calls that could not be used.
#[derive(Debug)]
pub struct Scan<E> {
    /// Usable call sites in block and instruction order
    pub sites: Vec<CallSite<E>>,
    /// Decrypter calls whose arguments are not constant loads
    pub skipped: usize,
    /// Candidate calls whose target could not be resolved
    pub unresolved: usize,
}

impl<E> Default for Scan<E> {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            skipped: 0,
            unresolved: 0,
        }
    }
}

/// Full name of the declaring type and name of the method a call token refers to,
/// without resolving it.
fn target_name(module: &ModuleDef, token: Token) -> Option<(String, &str)> {
    match token.table() {
        Token::METHOD_DEF => {
            let method = module.method_def(token).ok()?;
            let owner = module.type_full_name(method.declaring_type).ok()?;
            Some((owner, method.name.as_str()))
        }
        Token::MEMBER_REF => {
            let member = module.member_ref(token).ok()?;
            let owner = match member.parent.table() {
                // vararg call sites reference their MethodDef directly
                Token::METHOD_DEF => target_name(module, member.parent)?.0,
                Token::TYPE_SPEC => match module.type_spec(member.parent).ok()? {
                    TypeSig::GenericInst { generic, .. } => module.type_sig_name(generic).ok()?,
                    other => module.type_sig_name(other).ok()?,
                },
                _ => module.type_full_name(member.parent).ok()?,
            };
            Some((owner, member.name.as_str()))
        }
        Token::METHOD_SPEC => module
            .method_spec(token)
            .ok()
            .and_then(|spec| target_name(module, spec.method)),
        _ => None,
    }
}

/// Appends the call sites of `block` to `scan`.
///
/// A call whose declaring type and name match a decrypter but whose target cannot be
/// resolved is abandoned and counted in [`Scan::unresolved`]; the scan goes on with the
/// next call.
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if the resolved target's rows are inconsistent.
pub fn scan_block<E: Clone>(
    context: &ResolverContext,
    module: &ResolvedModule,
    registry: &DecrypterRegistry<E>,
    block_index: usize,
    block: &Block,
    scan: &mut Scan<E>,
) -> Result<()> {
    // first instruction not claimed by an earlier site
    let mut free = 0;

    for (index, instruction) in block.instructions.iter().enumerate() {
        if !matches!(instruction.opcode, OpCode::Call | OpCode::Callvirt) {
            continue;
        }
        let Some(target) = instruction.token_operand() else {
            continue;
        };
        if !target_name(module.module(), target)
            .is_some_and(|(owner, name)| registry.might_match(&owner, name))
        {
            continue;
        }

        let method = match context.resolve_method(module, target) {
            Ok(method) => method,
            Err(Error::Unresolvable { reference, token }) => {
                log::warn!(
                    "Abandoning call to {} ({}) in block {}: target is unresolvable",
                    reference,
                    token,
                    block_index
                );
                scan.unresolved += 1;
                continue;
            }
            Err(error) => return Err(error),
        };
        let Some(decrypter) = registry.lookup(&method)? else {
            continue;
        };

        let arg_count = method.handle.def()?.signature.arg_count();
        let args = index
            .checked_sub(arg_count)
            .filter(|start| *start >= free)
            .and_then(|start| {
                block.instructions[start..index]
                    .iter()
                    .map(|load| ConstValue::from_instruction(module.module(), load))
                    .collect::<Option<Vec<_>>>()
            });
        let Some(args) = args else {
            log::debug!(
                "Skipping call to {} in block {}: arguments are not constant",
                method.handle.display,
                block_index
            );
            scan.skipped += 1;
            continue;
        };

        free = index + 1;
        scan.sites.push(CallSite {
            block: block_index,
            start: index - arg_count,
            call: index,
            target,
            method,
            decrypter: decrypter.clone(),
            args,
            value: None,
        });
    }

    Ok(())
}

/// Returns true if `instruction` is a no-op on a string value: `castclass`/`isinst` to
/// `System.String` or a call to `System.String::Intern`.
#[must_use]
pub fn is_string_no_op(module: &ModuleDef, instruction: &Instruction) -> bool {
    let Some(token) = instruction.token_operand() else {
        return false;
    };

    match instruction.opcode {
        OpCode::Castclass | OpCode::Isinst => module
            .type_full_name(token)
            .is_ok_and(|name| name == "System.String"),
        OpCode::Call => match token.table() {
            Token::MEMBER_REF => module.member_ref(token).is_ok_and(|member| {
                member.name == "Intern"
                    && matches!(&member.signature, MemberSig::Method(sig) if sig.arg_count() == 1)
                    && module
                        .type_full_name(member.parent)
                        .is_ok_and(|name| name == "System.String")
            }),
            Token::METHOD_DEF => module.method_def(token).is_ok_and(|method| {
                method.name == "Intern"
                    && method.signature.arg_count() == 1
                    && module
                        .type_full_name(method.declaring_type)
                        .is_ok_and(|name| name == "System.String")
            }),
            _ => false,
        },
        _ => false,
    }
}
