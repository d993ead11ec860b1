//! Type alias expansion.
//!
//! A `PendingExpansion` term names an alias plus raw arguments. Dispatch
//! saturates the arguments (explicit, pack decomposition, defaults, error
//! fillers - in that order), guards against infinite expansions, applies the
//! substitution and binds the pending term to the instantiation. Identical
//! saturated signatures share one instantiation through a cache.

use crate::arena::TypeArena;
use crate::constraint::ConstraintId;
use crate::errors::{SymbolContext, TypeErrorData};
use crate::intern::Atom;
use crate::scope::ScopeId;
use crate::solver::{ConstraintSolver, InstantiationSignature};
use crate::substitute::Substitution;
use crate::types::*;
use crate::visitor::{self, GraphNode};

/// Fill an alias's parameter slots from raw arguments.
///
/// Postcondition: the returned vectors have exactly as many entries as the
/// alias has type and pack parameters.
pub(crate) fn saturate_arguments(
    arena: &mut TypeArena,
    alias: &TypeFunction,
    raw_types: &[TypeId],
    raw_packs: &[TypePackId],
) -> (Vec<TypeId>, Vec<TypePackId>) {
    let types_required = alias.type_params.len();
    let packs_required = alias.type_pack_params.len();

    let mut saturated_types = Vec::new();
    let mut extra_types = Vec::new();
    let mut saturated_packs = Vec::new();

    for (i, &ty) in raw_types.iter().enumerate() {
        if i < types_required {
            saturated_types.push(ty);
        } else {
            extra_types.push(ty);
        }
    }

    // Overflowing types pack into the first pack slot. This is mutually
    // exclusive with the pack-to-type decomposition below: extra_types only
    // has elements when every type slot is already full.
    if !extra_types.is_empty() && packs_required > 0 {
        saturated_packs.push(arena.pack(extra_types.clone()));
    }

    for &tp in raw_packs {
        let slice = arena.flatten(tp);
        // A single-element finite pack can decompose into a type argument
        // while type slots remain and no pack slot has been filled yet.
        if saturated_types.len() < types_required
            && slice.head.len() == 1
            && slice.is_finite()
            && saturated_packs.is_empty()
        {
            saturated_types.push(slice.head[0]);
        } else if saturated_packs.len() < packs_required {
            saturated_packs.push(tp);
        }
    }

    let types_provided = saturated_types.len();
    let packs_provided = saturated_packs.len();
    debug_assert!(types_provided <= types_required);

    // Defaults apply when type slots are missing and no packs were given, or
    // when every type slot is filled but pack slots are missing. A caller
    // who provided packs but not enough types gets an error filler instead;
    // silently using defaults there would mask the mistake.
    let needs_defaults = (types_provided < types_required && packs_provided == 0)
        || (types_provided == types_required && packs_provided < packs_required);

    if needs_defaults {
        let mut subst = Substitution::new(arena);
        for i in 0..types_provided {
            subst.replace_type(alias.type_params[i].ty, saturated_types[i]);
        }

        // Defaults may reference earlier parameters, so they substitute
        // left-to-right through the accumulating map.
        for i in types_provided..types_required {
            let Some(default) = alias.type_params[i].default else {
                break;
            };
            let instantiated = subst.substitute(default).unwrap_or(TypeId::ERROR);
            subst.replace_type(alias.type_params[i].ty, instantiated);
            saturated_types.push(instantiated);
        }

        for i in 0..packs_provided {
            subst.replace_pack(alias.type_pack_params[i].tp, saturated_packs[i]);
        }

        for i in packs_provided..packs_required {
            let Some(default) = alias.type_pack_params[i].default else {
                break;
            };
            let instantiated = subst.substitute_pack(default).unwrap_or(TypePackId::ERROR);
            subst.replace_pack(alias.type_pack_params[i].tp, instantiated);
            saturated_packs.push(instantiated);
        }
    }

    // With no overflow pack and exactly one pack slot still open, the open
    // slot is the empty pack.
    if extra_types.is_empty() && saturated_packs.len() + 1 == packs_required {
        let empty = arena.pack(Vec::new());
        saturated_packs.push(empty);
    }

    // Error fillers keep the substitution total even for malformed uses.
    while saturated_types.len() < types_required {
        saturated_types.push(TypeId::ERROR);
    }
    while saturated_packs.len() < packs_required {
        saturated_packs.push(TypePackId::ERROR);
    }

    debug_assert_eq!(saturated_types.len(), types_required);
    debug_assert_eq!(saturated_packs.len(), packs_required);

    (saturated_types, saturated_packs)
}

impl ConstraintSolver {
    pub(crate) fn dispatch_alias_expansion(&mut self, id: ConstraintId, target: TypeId) -> bool {
        let target = self.arena.follow(target);
        let petv = match self.arena.get(target) {
            TypeData::PendingExpansion(pe) => pe.clone(),
            // Something else already resolved the term.
            _ => {
                self.unblock_type(target);
                return true;
            }
        };

        let scope = self.constraint(id).scope;
        let location = self.constraint(id).location;

        let alias = match petv.prefix {
            Some(prefix) => self.scopes.lookup_imported_type(scope, prefix, petv.name),
            None => self.scopes.lookup_type(scope, petv.name),
        };

        let Some(alias) = alias else {
            self.report_error(
                TypeErrorData::UnknownSymbol {
                    name: self.names.resolve(petv.name).to_string(),
                    context: SymbolContext::Type,
                },
                location,
            );
            self.bind_expansion(target, TypeId::ERROR);
            return true;
        };

        // A parameterless alias is just its body.
        if alias.type_params.is_empty() && alias.type_pack_params.is_empty() {
            self.bind_expansion(target, alias.body);
            return true;
        }

        // A corecursive alias of size zero: the body leads straight back to
        // the term being expanded.
        if visitor::occurs(&self.arena, target, alias.body) {
            self.report_error(TypeErrorData::OccursCheckFailed, location);
            self.bind_expansion(target, TypeId::ERROR);
            return true;
        }

        let (type_args, pack_args) =
            saturate_arguments(&mut self.arena, &alias, &petv.type_args, &petv.pack_args);

        // Identity substitution: the saturated arguments are the parameters
        // themselves, so the alias body already is the instantiation.
        let same_types = type_args.len() == alias.type_params.len()
            && type_args
                .iter()
                .zip(&alias.type_params)
                .all(|(&arg, param)| arg == param.ty);
        let same_packs = pack_args.len() == alias.type_pack_params.len()
            && pack_args
                .iter()
                .zip(&alias.type_pack_params)
                .all(|(&arg, param)| arg == param.tp);
        if same_types && same_packs {
            self.bind_expansion(target, alias.body);
            return true;
        }

        let signature = InstantiationSignature {
            alias: self.arena.follow(alias.body),
            type_args: type_args.clone(),
            pack_args: pack_args.clone(),
        };

        // Instantiation is deterministic; identical signatures share a term.
        if let Some(&cached) = self.instantiated_aliases.get(&signature) {
            self.bind_expansion(target, cached);
            return true;
        }

        // Scan for the same alias applied with different arguments inside
        // its own body; expanding such a type never terminates, so it is
        // caught before any substitution happens.
        if self.find_infinite_expansion(scope, &signature, alias.body) {
            self.bind_expansion(target, TypeId::ERROR);
            self.report_error(
                TypeErrorData::GenericError {
                    message: "Recursive type being used with different parameters".to_string(),
                },
                location,
            );
            return true;
        }

        let instantiated = {
            let mut subst = Substitution::new(&mut self.arena);
            for (param, &arg) in alias.type_params.iter().zip(&type_args) {
                subst.replace_type(param.ty, arg);
            }
            for (param, &arg) in alias.type_pack_params.iter().zip(&pack_args) {
                subst.replace_pack(param.tp, arg);
            }
            subst.substitute(alias.body)
        };

        let Ok(instantiated) = instantiated else {
            self.report_error(TypeErrorData::CodeTooComplex, location);
            self.bind_expansion(target, TypeId::ERROR);
            return true;
        };

        let mut result = self.arena.follow(instantiated);

        // The substitution does not recurse into nested applications; queue
        // them so the expansion completes.
        self.queue_instantiations(scope, location, GraphNode::Type(result));

        if result.is_persistent() {
            self.bind_expansion(target, result);
            self.instantiated_aliases.insert(signature, result);
            return true;
        }

        // Substitution returns the alias body itself when no generic
        // actually appears in it, and a rebuilt metatable wrapper can still
        // share the body's inner table; decorating a shared table would
        // bleed the instantiated parameters into every other use, so clone
        // first.
        let body_table = self.underlying_table(alias.body);
        let needs_clone = self.arena.follow(alias.body) == result
            || (body_table.is_some() && self.underlying_table(result) == body_table);
        result = self.decorate_instantiated_table(result, needs_clone, &type_args, &pack_args);

        self.bind_expansion(target, result);
        self.instantiated_aliases.insert(signature, result);

        true
    }

    fn bind_expansion(&mut self, target: TypeId, result: TypeId) {
        if matches!(self.arena.get(target), TypeData::PendingExpansion(_)) {
            *self.arena.get_mut(target) = TypeData::Bound(result);
        }
        self.unblock_type(target);
    }

    /// The table a term decorates: the term itself for tables, the inner
    /// table for metatable wrappers.
    fn underlying_table(&self, ty: TypeId) -> Option<TypeId> {
        let ty = self.arena.follow(ty);
        match self.arena.get(ty) {
            TypeData::Table(_) => Some(ty),
            TypeData::Metatable(mt) => {
                let table = self.arena.follow(mt.table);
                match self.arena.get(table) {
                    TypeData::Table(_) => Some(table),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Record the instantiated parameters on the result table, cloning the
    /// node when it is shared with the alias definition.
    fn decorate_instantiated_table(
        &mut self,
        result: TypeId,
        needs_clone: bool,
        type_args: &[TypeId],
        pack_args: &[TypePackId],
    ) -> TypeId {
        match self.arena.get(result).clone() {
            TypeData::Table(tt) => {
                let table_id = if needs_clone {
                    self.arena.add(TypeData::Table(tt.clone()))
                } else {
                    result
                };
                if let TypeData::Table(tt) = self.arena.get_mut(table_id) {
                    tt.instantiated_type_params = type_args.to_vec();
                    tt.instantiated_pack_params = pack_args.to_vec();
                }
                table_id
            }
            TypeData::Metatable(mt) => {
                let (mt_id, inner) = if needs_clone {
                    // A shallow clone of a metatable still shares its inner
                    // table; clone that too before mutating.
                    let inner_data = self.arena.get(self.arena.follow(mt.table)).clone();
                    let inner = self.arena.add(inner_data);
                    let cloned = self.arena.add(TypeData::Metatable(MetatableType {
                        table: inner,
                        metatable: mt.metatable,
                        synthetic_name: mt.synthetic_name,
                    }));
                    (cloned, inner)
                } else {
                    (result, self.arena.follow(mt.table))
                };
                if let TypeData::Table(tt) = self.arena.get_mut(inner) {
                    tt.instantiated_type_params = type_args.to_vec();
                    tt.instantiated_pack_params = pack_args.to_vec();
                }
                mt_id
            }
            _ => result,
        }
    }

    /// Does the alias body apply the alias being expanded with different
    /// saturated arguments anywhere inside itself?
    fn find_infinite_expansion(
        &mut self,
        scope: ScopeId,
        signature: &InstantiationSignature,
        body: TypeId,
    ) -> bool {
        // Collect first: saturation allocates, and the traversal must not
        // hold the arena while that happens.
        let mut nested: Vec<(Option<Atom>, Atom, Vec<TypeId>, Vec<TypePackId>)> = Vec::new();
        visitor::visit_once(
            &self.arena,
            GraphNode::Type(body),
            &mut |_, data| {
                if let TypeData::PendingExpansion(pe) = data {
                    nested.push((
                        pe.prefix,
                        pe.name,
                        pe.type_args.clone(),
                        pe.pack_args.clone(),
                    ));
                    return false;
                }
                true
            },
            &mut |_, _| true,
        );

        for (prefix, name, raw_types, raw_packs) in nested {
            let alias = match prefix {
                Some(prefix) => self.scopes.lookup_imported_type(scope, prefix, name),
                None => self.scopes.lookup_type(scope, name),
            };
            let Some(alias) = alias else {
                continue;
            };

            let (type_args, pack_args) =
                saturate_arguments(&mut self.arena, &alias, &raw_types, &raw_packs);

            if self.arena.follow(alias.body) == self.arena.follow(signature.alias)
                && (type_args != signature.type_args || pack_args != signature.pack_args)
            {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::NameInterner;

    fn generic(arena: &mut TypeArena, names: &mut NameInterner, name: &str) -> TypeId {
        let name = names.intern(name);
        arena.add(TypeData::Generic(GenericType { name }))
    }

    fn alias_with_params(
        arena: &mut TypeArena,
        names: &mut NameInterner,
        params: &[&str],
    ) -> TypeFunction {
        let type_params = params
            .iter()
            .map(|p| GenericTypeParam {
                ty: generic(arena, names, p),
                default: None,
            })
            .collect();
        TypeFunction {
            type_params,
            type_pack_params: Vec::new(),
            body: TypeId::NUMBER,
        }
    }

    #[test]
    fn exact_arguments_pass_through() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();
        let alias = alias_with_params(&mut arena, &mut names, &["A", "B"]);

        let (types, packs) =
            saturate_arguments(&mut arena, &alias, &[TypeId::STRING, TypeId::NUMBER], &[]);
        assert_eq!(types, vec![TypeId::STRING, TypeId::NUMBER]);
        assert!(packs.is_empty());
    }

    #[test]
    fn defaults_substitute_left_to_right() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();

        // type Pair<A, B = A>
        let a = generic(&mut arena, &mut names, "A");
        let b = generic(&mut arena, &mut names, "B");
        let alias = TypeFunction {
            type_params: vec![
                GenericTypeParam { ty: a, default: None },
                GenericTypeParam {
                    ty: b,
                    default: Some(a),
                },
            ],
            type_pack_params: Vec::new(),
            body: TypeId::NUMBER,
        };

        let (types, _) = saturate_arguments(&mut arena, &alias, &[TypeId::STRING], &[]);
        assert_eq!(types, vec![TypeId::STRING, TypeId::STRING]);
    }

    #[test]
    fn missing_arguments_fill_with_error_recovery() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();
        let alias = alias_with_params(&mut arena, &mut names, &["A", "B"]);

        let (types, _) = saturate_arguments(&mut arena, &alias, &[TypeId::STRING], &[]);
        assert_eq!(types, vec![TypeId::STRING, TypeId::ERROR]);
    }

    #[test]
    fn overflow_types_pack_into_first_pack_slot() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();
        let rest = names.intern("Rest");
        let rest_pack = arena.add_pack(PackData::Generic { name: rest });
        let mut alias = alias_with_params(&mut arena, &mut names, &["A"]);
        alias.type_pack_params.push(GenericPackParam {
            tp: rest_pack,
            default: None,
        });

        let (types, packs) = saturate_arguments(
            &mut arena,
            &alias,
            &[TypeId::STRING, TypeId::NUMBER, TypeId::BOOLEAN],
            &[],
        );
        assert_eq!(types, vec![TypeId::STRING]);
        assert_eq!(packs.len(), 1);
        let slice = arena.flatten(packs[0]);
        assert_eq!(slice.head, vec![TypeId::NUMBER, TypeId::BOOLEAN]);
    }

    #[test]
    fn single_element_pack_decomposes_into_type_slot() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();
        let alias = alias_with_params(&mut arena, &mut names, &["A"]);

        let singleton_pack = arena.pack(vec![TypeId::BOOLEAN]);
        let (types, packs) = saturate_arguments(&mut arena, &alias, &[], &[singleton_pack]);
        assert_eq!(types, vec![TypeId::BOOLEAN]);
        assert!(packs.is_empty());
    }

    #[test]
    fn defaults_skipped_when_pack_supplied() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();

        let a = generic(&mut arena, &mut names, "A");
        let b = generic(&mut arena, &mut names, "B");
        let rest = names.intern("Rest");
        let rest_pack = arena.add_pack(PackData::Generic { name: rest });
        let alias = TypeFunction {
            type_params: vec![
                GenericTypeParam { ty: a, default: None },
                GenericTypeParam {
                    ty: b,
                    default: Some(a),
                },
            ],
            type_pack_params: vec![GenericPackParam {
                tp: rest_pack,
                default: None,
            }],
            body: TypeId::NUMBER,
        };

        // Two-element pack: does not decompose, fills the pack slot, and the
        // missing B gets the error filler rather than its default.
        let two = arena.pack(vec![TypeId::NUMBER, TypeId::STRING]);
        let (types, packs) =
            saturate_arguments(&mut arena, &alias, &[TypeId::STRING], &[two]);
        assert_eq!(types, vec![TypeId::STRING, TypeId::ERROR]);
        assert_eq!(packs, vec![two]);
    }
}
