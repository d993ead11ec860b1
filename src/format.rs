//! Type and constraint formatting.
//!
//! Centralizes the logic for converting terms, packs and constraints to
//! human-readable strings for traces and binding dumps. Depth-limited so a
//! cyclic graph prints something finite.

use crate::arena::TypeArena;
use crate::constraint::{Constraint, ConstraintKind};
use crate::intern::NameInterner;
use crate::types::*;

pub struct TypeFormatter<'a> {
    arena: &'a TypeArena,
    names: &'a NameInterner,
    max_depth: u32,
}

impl<'a> TypeFormatter<'a> {
    pub fn new(arena: &'a TypeArena, names: &'a NameInterner) -> Self {
        TypeFormatter {
            arena,
            names,
            max_depth: 5,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn fmt_type(&self, ty: TypeId) -> String {
        self.fmt_type_at(ty, 0)
    }

    fn fmt_type_at(&self, ty: TypeId, depth: u32) -> String {
        if depth > self.max_depth {
            return "...".to_string();
        }
        let ty = self.arena.follow(ty);

        match self.arena.get(ty) {
            TypeData::Free(_) => format!("'t{}", ty.0),
            TypeData::Bound(_) => unreachable!("follow strips bound links"),
            TypeData::Blocked(_) => format!("*blocked-{}*", ty.0),
            TypeData::PendingExpansion(pe) => {
                let name = match pe.prefix {
                    Some(prefix) => {
                        format!("{}.{}", self.names.resolve(prefix), self.names.resolve(pe.name))
                    }
                    None => self.names.resolve(pe.name).to_string(),
                };
                format!("*pending {name}*")
            }
            TypeData::FamilyInstance(fi) => {
                let args: Vec<String> = fi
                    .type_args
                    .iter()
                    .map(|&a| self.fmt_type_at(a, depth + 1))
                    .collect();
                format!("{}<{}>", fi.family.name(), args.join(", "))
            }
            TypeData::Local(lt) => format!("l-{}[{}]", ty.0, self.fmt_type_at(lt.domain, depth + 1)),
            TypeData::Function(ft) => {
                let generics = if ft.generics.is_empty() {
                    String::new()
                } else {
                    let gs: Vec<String> = ft
                        .generics
                        .iter()
                        .map(|&g| self.fmt_type_at(g, depth + 1))
                        .collect();
                    format!("<{}>", gs.join(", "))
                };
                format!(
                    "{}({}) -> {}",
                    generics,
                    self.fmt_pack_at(ft.arg_pack, depth + 1),
                    self.fmt_pack_at(ft.ret_pack, depth + 1)
                )
            }
            TypeData::Table(tt) => {
                if let Some(name) = tt.name.or(tt.synthetic_name) {
                    return self.names.resolve(name).to_string();
                }
                let mut parts: Vec<String> = tt
                    .props
                    .iter()
                    .map(|p| {
                        let shown = p.read_ty.or(p.write_ty).unwrap_or(TypeId::ERROR);
                        format!(
                            "{}: {}",
                            self.names.resolve(p.name),
                            self.fmt_type_at(shown, depth + 1)
                        )
                    })
                    .collect();
                if let Some(idx) = &tt.indexer {
                    parts.push(format!(
                        "[{}]: {}",
                        self.fmt_type_at(idx.key_ty, depth + 1),
                        self.fmt_type_at(idx.value_ty, depth + 1)
                    ));
                }
                format!("{{{}}}", parts.join(", "))
            }
            TypeData::Metatable(mt) => format!(
                "setmetatable({}, {})",
                self.fmt_type_at(mt.table, depth + 1),
                self.fmt_type_at(mt.metatable, depth + 1)
            ),
            TypeData::Class(ct) => self.names.resolve(ct.name).to_string(),
            TypeData::Union(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|&p| self.fmt_type_at(p, depth + 1))
                    .collect();
                rendered.join(" | ")
            }
            TypeData::Intersection(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|&p| self.fmt_type_at(p, depth + 1))
                    .collect();
                rendered.join(" & ")
            }
            TypeData::Primitive { kind, .. } => match kind {
                PrimitiveKind::Nil => "nil".to_string(),
                PrimitiveKind::Boolean => "boolean".to_string(),
                PrimitiveKind::Number => "number".to_string(),
                PrimitiveKind::String => "string".to_string(),
                PrimitiveKind::Table => "table".to_string(),
            },
            TypeData::Singleton(SingletonValue::Bool(b)) => b.to_string(),
            TypeData::Singleton(SingletonValue::Str(s)) => {
                format!("\"{}\"", self.names.resolve(*s))
            }
            TypeData::Generic(g) => self.names.resolve(g.name).to_string(),
            TypeData::Any => "any".to_string(),
            TypeData::Never => "never".to_string(),
            TypeData::Unknown => "unknown".to_string(),
            TypeData::Error => "*error-type*".to_string(),
        }
    }

    pub fn fmt_pack(&self, tp: TypePackId) -> String {
        self.fmt_pack_at(tp, 0)
    }

    fn fmt_pack_at(&self, tp: TypePackId, depth: u32) -> String {
        if depth > self.max_depth {
            return "...".to_string();
        }
        let tp = self.arena.follow_pack(tp);

        match self.arena.get_pack(tp) {
            PackData::Pack { head, tail } => {
                let mut parts: Vec<String> = head
                    .iter()
                    .map(|&t| self.fmt_type_at(t, depth + 1))
                    .collect();
                if let Some(tail) = tail {
                    parts.push(self.fmt_pack_at(*tail, depth + 1));
                }
                format!("({})", parts.join(", "))
            }
            PackData::Bound(_) => unreachable!("follow_pack strips bound links"),
            PackData::Free { .. } => format!("'p{}...", tp.0),
            PackData::Generic { name } => format!("{}...", self.names.resolve(*name)),
            PackData::Variadic(ty) => format!("...{}", self.fmt_type_at(*ty, depth + 1)),
            PackData::Blocked { .. } => format!("*blocked-pack-{}*", tp.0),
            PackData::Error => "*error-pack*".to_string(),
        }
    }

    pub fn fmt_constraint(&self, constraint: &Constraint) -> String {
        let kind = &constraint.kind;
        match kind {
            ConstraintKind::Subtype { sub, sup } => {
                format!("{} <: {}", self.fmt_type(*sub), self.fmt_type(*sup))
            }
            ConstraintKind::PackSubtype { sub, sup } => {
                format!("{} <: {}", self.fmt_pack(*sub), self.fmt_pack(*sup))
            }
            ConstraintKind::Generalization {
                source,
                generalized,
                ..
            } => format!(
                "{} ~ gen {}",
                self.fmt_type(*generalized),
                self.fmt_type(*source)
            ),
            ConstraintKind::Iterable {
                iterator,
                variables,
                ..
            } => format!(
                "{} ~ iterate {}",
                self.fmt_pack(*variables),
                self.fmt_pack(*iterator)
            ),
            ConstraintKind::Name { target, name, .. } => format!(
                "{} ~ name {}",
                self.fmt_type(*target),
                self.names.resolve(*name)
            ),
            ConstraintKind::AliasExpansion { target } => {
                format!("expand {}", self.fmt_type(*target))
            }
            ConstraintKind::Call {
                function,
                args,
                result,
                ..
            } => format!(
                "{} ~ call {}{}",
                self.fmt_pack(*result),
                self.fmt_type(*function),
                self.fmt_pack(*args)
            ),
            ConstraintKind::CheckCall { function, args, .. } => format!(
                "check call {}{}",
                self.fmt_type(*function),
                self.fmt_pack(*args)
            ),
            ConstraintKind::Primitive { free, primitive, .. } => format!(
                "prim {} ~ {}",
                self.fmt_type(*free),
                self.fmt_type(*primitive)
            ),
            ConstraintKind::HasProp {
                subject,
                prop,
                result,
                ..
            } => format!(
                "{} ~ hasProp {}, \"{}\"",
                self.fmt_type(*result),
                self.fmt_type(*subject),
                self.names.resolve(*prop)
            ),
            ConstraintKind::SetProp { subject, path, .. } => {
                let path: Vec<&str> = path.iter().map(|&a| self.names.resolve(a)).collect();
                format!("setProp {} .{}", self.fmt_type(*subject), path.join("."))
            }
            ConstraintKind::HasIndexer {
                subject,
                index,
                result,
            } => format!(
                "{} ~ hasIndexer {} [{}]",
                self.fmt_type(*result),
                self.fmt_type(*subject),
                self.fmt_type(*index)
            ),
            ConstraintKind::SetIndexer { subject, index, .. } => format!(
                "setIndexer {} [{}]",
                self.fmt_type(*subject),
                self.fmt_type(*index)
            ),
            ConstraintKind::Unpack { source, result, .. } => format!(
                "{} ~ unpack {}",
                self.fmt_pack(*result),
                self.fmt_pack(*source)
            ),
            ConstraintKind::Unpack1 { source, result, .. } => format!(
                "{} ~ unpack1 {}",
                self.fmt_type(*result),
                self.fmt_type(*source)
            ),
            ConstraintKind::Reduce { ty } => format!("reduce {}", self.fmt_type(*ty)),
            ConstraintKind::ReducePack { pack } => format!("reduce {}", self.fmt_pack(*pack)),
            ConstraintKind::Equality { result, assignment } => format!(
                "{} ~ eq {}",
                self.fmt_type(*result),
                self.fmt_type(*assignment)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeArena;

    #[test]
    fn primitives_and_unions_render() {
        let mut arena = TypeArena::new();
        let names = NameInterner::new();
        let u = arena.add(TypeData::Union(vec![TypeId::NUMBER, TypeId::NIL]));

        let fmt = TypeFormatter::new(&arena, &names);
        assert_eq!(fmt.fmt_type(TypeId::NUMBER), "number");
        assert_eq!(fmt.fmt_type(u), "number | nil");
    }

    #[test]
    fn cyclic_table_rendering_is_finite() {
        let mut arena = TypeArena::new();
        let mut names = NameInterner::new();
        let t = arena.add(TypeData::Table(TableType::new(
            TableState::Sealed,
            ScopeArena::ROOT,
        )));
        let next = names.intern("next");
        if let TypeData::Table(tt) = arena.get_mut(t) {
            tt.props.push(TableProp::rw(next, t));
        }

        let fmt = TypeFormatter::new(&arena, &names).with_max_depth(3);
        let rendered = fmt.fmt_type(t);
        assert!(rendered.contains("next"));
        assert!(rendered.contains("..."));
    }

    #[test]
    fn functions_render_packs() {
        let mut arena = TypeArena::new();
        let names = NameInterner::new();
        let args = arena.pack(vec![TypeId::NUMBER, TypeId::STRING]);
        let rets = arena.pack(vec![TypeId::BOOLEAN]);
        let f = arena.add(TypeData::Function(FunctionType::new(args, rets)));

        let fmt = TypeFormatter::new(&arena, &names);
        assert_eq!(fmt.fmt_type(f), "(number, string) -> (boolean)");
    }
}
