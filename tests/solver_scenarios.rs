//! End-to-end scenarios: a constraint batch the generator would emit for a
//! small program, solved to quiescence, with the resulting bindings checked
//! through the arena.

use brio_solver::types::*;
use brio_solver::*;

fn run_solver(
    arena: TypeArena,
    scopes: ScopeArena,
    names: NameInterner,
    constraints: Vec<Constraint>,
) -> ConstraintSolver {
    let mut solver = ConstraintSolver::new(
        arena,
        scopes,
        names,
        ScopeArena::ROOT,
        constraints,
        "scenario".to_string(),
        Box::new(NullModuleResolver),
        Vec::new(),
        SolverConfig::default(),
        SolverLimits::default(),
    );
    solver.run().expect("no limits configured");
    solver
}

fn constraint(kind: ConstraintKind) -> Constraint {
    Constraint::new(ScopeArena::ROOT, Location::default(), kind)
}

#[test]
fn arithmetic_call_resolves_to_number() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    // local x = 1 + 2, modeled as a call to add : (number, number) -> number
    let params = arena.pack(vec![TypeId::NUMBER, TypeId::NUMBER]);
    let rets = arena.pack(vec![TypeId::NUMBER]);
    let add = arena.add(TypeData::Function(FunctionType::new(params, rets)));

    let call_args = arena.pack(vec![TypeId::NUMBER, TypeId::NUMBER]);
    let result = arena.add_pack(PackData::Blocked { owner: None });

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Call {
            function: add,
            args: call_args,
            result,
            call_site: None,
            discriminants: Vec::new(),
        })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());

    let resolved = solver.arena.first(result).expect("one return value");
    assert_eq!(solver.arena.follow(resolved), TypeId::NUMBER);
}

#[test]
fn alias_expansion_with_default_referencing_earlier_parameter() {
    let mut arena = TypeArena::new();
    let mut scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // type Pair<A, B = A> = {first: A, second: B}
    let a = arena.add(TypeData::Generic(GenericType {
        name: names.intern("A"),
    }));
    let b = arena.add(TypeData::Generic(GenericType {
        name: names.intern("B"),
    }));

    let first = names.intern("first");
    let second = names.intern("second");
    let mut body = TableType::new(TableState::Sealed, ScopeArena::ROOT);
    body.props.push(TableProp::rw(first, a));
    body.props.push(TableProp::rw(second, b));
    let body = arena.add(TypeData::Table(body));

    let pair = names.intern("Pair");
    scopes.get_mut(ScopeArena::ROOT).type_aliases.insert(
        pair,
        TypeFunction {
            type_params: vec![
                GenericTypeParam {
                    ty: a,
                    default: None,
                },
                GenericTypeParam {
                    ty: b,
                    default: Some(a),
                },
            ],
            type_pack_params: Vec::new(),
            body,
        },
    );

    // local p: Pair<string>
    let target = arena.add(TypeData::PendingExpansion(PendingExpansion {
        prefix: None,
        name: pair,
        type_args: vec![TypeId::STRING],
        pack_args: Vec::new(),
    }));

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::AliasExpansion { target })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());

    let expanded = solver.arena.follow(target);
    let TypeData::Table(tt) = solver.arena.get(expanded) else {
        panic!("expected the expansion to produce a table");
    };

    let first_ty = tt.prop(first).and_then(|p| p.read_ty).expect("first exists");
    let second_ty = tt.prop(second).and_then(|p| p.read_ty).expect("second exists");
    assert_eq!(solver.arena.follow(first_ty), TypeId::STRING);
    assert_eq!(solver.arena.follow(second_ty), TypeId::STRING);
}

#[test]
fn generic_call_instantiates_and_records_overload() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // function f<T>(x: T): T return x end; local r = f(5)
    let t = arena.add(TypeData::Generic(GenericType {
        name: names.intern("T"),
    }));
    let params = arena.pack(vec![t]);
    let rets = arena.pack(vec![t]);
    let mut ft = FunctionType::new(params, rets);
    ft.generics.push(t);
    let f = arena.add(TypeData::Function(ft));

    let call_args = arena.pack(vec![TypeId::NUMBER]);
    let result = arena.add_pack(PackData::Blocked { owner: None });

    let call_expr = ExprId(10);
    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Call {
            function: f,
            args: call_args,
            result,
            call_site: Some(CallSite {
                expr: call_expr,
                args: vec![(ExprId(11), ArgExprKind::Constant)],
                self_call: false,
            }),
            discriminants: Vec::new(),
        })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());

    let resolved = solver.arena.first(result).expect("one return value");
    assert_eq!(solver.arena.follow(resolved), TypeId::NUMBER);

    // The recorded overload is the instantiated callable for this site.
    let recorded = solver.ast_overload_resolved_types[&call_expr];
    let TypeData::Function(recorded_ft) = solver.arena.get(solver.arena.follow(recorded)) else {
        panic!("expected a function type at the call site");
    };
    let first_param = solver
        .arena
        .first(recorded_ft.arg_pack)
        .expect("one parameter");
    assert_eq!(solver.arena.follow(first_param), TypeId::NUMBER);
}

#[test]
fn recursive_table_property_lookup_terminates() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // type R = {next: R?}; local m = n.next and n.next.next
    let r = arena.add(TypeData::Table(TableType::new(
        TableState::Sealed,
        ScopeArena::ROOT,
    )));
    let opt_r = arena.add(TypeData::Union(vec![r, TypeId::NIL]));
    let next = names.intern("next");
    if let TypeData::Table(tt) = arena.get_mut(r) {
        tt.props.push(TableProp::rw(next, opt_r));
    }

    let first_hop = arena.fresh_blocked(None);
    let second_hop = arena.fresh_blocked(None);

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![
            constraint(ConstraintKind::HasProp {
                subject: r,
                prop: next,
                result: first_hop,
                context: ValueContext::RValue,
                in_conditional: false,
                suppress_simplification: false,
            }),
            constraint(ConstraintKind::HasProp {
                subject: opt_r,
                prop: next,
                result: second_hop,
                context: ValueContext::RValue,
                in_conditional: false,
                suppress_simplification: false,
            }),
        ],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());
    assert_eq!(solver.arena.follow(first_hop), opt_r);
    // Looking up through R? sees nil contribute nothing and R contribute R?.
    assert_eq!(solver.arena.follow(second_hop), opt_r);
}

#[test]
fn recursive_alias_with_different_parameters_is_an_error() {
    let mut arena = TypeArena::new();
    let mut scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // type Bad<T> = Bad<T | number>
    let t = arena.add(TypeData::Generic(GenericType {
        name: names.intern("T"),
    }));
    let widened = arena.add(TypeData::Union(vec![t, TypeId::NUMBER]));
    let bad = names.intern("Bad");
    let body = arena.add(TypeData::PendingExpansion(PendingExpansion {
        prefix: None,
        name: bad,
        type_args: vec![widened],
        pack_args: Vec::new(),
    }));
    scopes.get_mut(ScopeArena::ROOT).type_aliases.insert(
        bad,
        TypeFunction {
            type_params: vec![GenericTypeParam {
                ty: t,
                default: None,
            }],
            type_pack_params: Vec::new(),
            body,
        },
    );

    let target = arena.add(TypeData::PendingExpansion(PendingExpansion {
        prefix: None,
        name: bad,
        type_args: vec![TypeId::STRING],
        pack_args: Vec::new(),
    }));

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::AliasExpansion { target })],
    );

    assert_eq!(solver.arena.follow(target), TypeId::ERROR);
    assert!(solver.errors.iter().any(|e| e.data
        == TypeErrorData::GenericError {
            message: "Recursive type being used with different parameters".to_string()
        }));
}

#[test]
fn for_in_over_indexed_table_binds_key_and_value() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    // for k, v in {[string]: number}
    let mut table = TableType::new(TableState::Sealed, ScopeArena::ROOT);
    table.indexer = Some(TableIndexer {
        key_ty: TypeId::STRING,
        value_ty: TypeId::NUMBER,
    });
    let table = arena.add(TypeData::Table(table));

    let k = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 1,
    }));
    let v = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 1,
    }));

    let iterator = arena.pack(vec![table]);
    let variables = arena.pack(vec![k, v]);

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Iterable {
            iterator,
            variables,
            next_expr: None,
        })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());
    assert_eq!(solver.arena.follow(k), TypeId::STRING);
    assert_eq!(solver.arena.follow(v), TypeId::NUMBER);
}

#[test]
fn for_in_through_iter_metamethod_strips_nil_from_first_return() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // The __iter metamethod returns (next, t) where
    // next : (t, nil) -> (string?, number)
    let string_or_nil = arena.add(TypeData::Union(vec![TypeId::STRING, TypeId::NIL]));

    let inner_table = arena.add(TypeData::Table(TableType::new(
        TableState::Sealed,
        ScopeArena::ROOT,
    )));

    let next_params = arena.pack(vec![inner_table, TypeId::NIL]);
    let next_rets = arena.pack(vec![string_or_nil, TypeId::NUMBER]);
    let next_fn = arena.add(TypeData::Function(FunctionType::new(next_params, next_rets)));

    let iteratee_placeholder = arena.add(TypeData::Table(TableType::new(
        TableState::Sealed,
        ScopeArena::ROOT,
    )));
    let iter_params = arena.pack(vec![iteratee_placeholder]);
    let iter_rets = arena.pack(vec![next_fn, inner_table, TypeId::NIL]);
    let iter_fn = arena.add(TypeData::Function(FunctionType::new(iter_params, iter_rets)));

    let iter_atom = names.intern("__iter");
    let mut metatable = TableType::new(TableState::Sealed, ScopeArena::ROOT);
    metatable.props.push(TableProp::rw(iter_atom, iter_fn));
    let metatable = arena.add(TypeData::Table(metatable));

    let iteratee = arena.add(TypeData::Metatable(MetatableType {
        table: inner_table,
        metatable,
        synthetic_name: None,
    }));

    let k = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 1,
    }));
    let v = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 1,
    }));

    let iterator = arena.pack(vec![iteratee]);
    let variables = arena.pack(vec![k, v]);

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Iterable {
            iterator,
            variables,
            next_expr: None,
        })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());
    // The loop variable is non-nil inside the body even though next may
    // return nil to signal termination.
    assert_eq!(solver.arena.follow(k), TypeId::STRING);
    assert_eq!(solver.arena.follow(v), TypeId::NUMBER);
}

#[test]
fn unpack_accumulates_a_union_across_writes() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    let assigned = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 2,
    }));

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![
            constraint(ConstraintKind::Unpack1 {
                source: TypeId::NUMBER,
                result: assigned,
                result_is_lvalue: true,
            }),
            constraint(ConstraintKind::Unpack1 {
                source: TypeId::STRING,
                result: assigned,
                result_is_lvalue: true,
            }),
        ],
    );

    assert!(solver.is_done());
    let resolved = solver.arena.follow(assigned);
    let TypeData::Union(parts) = solver.arena.get(resolved) else {
        panic!("expected the accumulated domain to be a union");
    };
    let followed: Vec<TypeId> = parts.iter().map(|&p| solver.arena.follow(p)).collect();
    assert!(followed.contains(&TypeId::NUMBER));
    assert!(followed.contains(&TypeId::STRING));
}

#[test]
fn generalization_quantifies_unconstrained_frees() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    let param = arena.fresh_free(ScopeArena::ROOT);
    let params = arena.pack(vec![param]);
    let rets = arena.pack(vec![param]);
    let source = arena.add(TypeData::Function(FunctionType::new(params, rets)));
    let generalized = arena.fresh_blocked(None);

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Generalization {
            source,
            generalized,
            interior: Vec::new(),
        })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());
    assert_eq!(solver.arena.follow(generalized), source);
    assert!(matches!(
        solver.arena.get(solver.arena.follow(param)),
        TypeData::Generic(_)
    ));
}

#[test]
fn primitive_constraint_prefers_lower_bound_for_singletons() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    let true_ty = arena.add(TypeData::Singleton(SingletonValue::Bool(true)));
    let free = arena.add(TypeData::Free(FreeType {
        scope: ScopeArena::ROOT,
        lower_bound: true_ty,
        upper_bound: true_ty,
    }));

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Primitive {
            free,
            primitive: TypeId::BOOLEAN,
            expected: None,
        })],
    );

    assert!(solver.is_done());
    assert_eq!(solver.arena.follow(free), true_ty);
}

#[test]
fn primitive_constraint_defaults_to_the_primitive() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    let free = arena.fresh_free(ScopeArena::ROOT);

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Primitive {
            free,
            primitive: TypeId::BOOLEAN,
            expected: None,
        })],
    );

    assert_eq!(solver.arena.follow(free), TypeId::BOOLEAN);
}

#[test]
fn check_call_pushes_expected_types_into_lambda_parameters() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    // callee : ((number) -> ()) -> ()
    let expected_params = arena.pack(vec![TypeId::NUMBER]);
    let expected_lambda = arena.add(TypeData::Function(FunctionType::new(
        expected_params,
        TypePackId::EMPTY,
    )));
    let callee_params = arena.pack(vec![expected_lambda]);
    let callee = arena.add(TypeData::Function(FunctionType::new(
        callee_params,
        TypePackId::EMPTY,
    )));

    // callee(function(x) ... end) with x unannotated
    let lambda_param = arena.fresh_free(ScopeArena::ROOT);
    let lambda_params = arena.pack(vec![lambda_param]);
    let lambda = arena.add(TypeData::Function(FunctionType::new(
        lambda_params,
        TypePackId::EMPTY,
    )));
    let call_args = arena.pack(vec![lambda]);

    let arg_expr = ExprId(21);
    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::CheckCall {
            function: callee,
            args: call_args,
            call_site: CallSite {
                expr: ExprId(20),
                args: vec![(
                    arg_expr,
                    ArgExprKind::Lambda {
                        annotated: vec![false],
                    },
                )],
                self_call: false,
            },
        })],
    );

    assert!(solver.is_done());
    assert_eq!(solver.arena.follow(lambda_param), TypeId::NUMBER);
    assert_eq!(
        solver.arena.follow(solver.ast_expected_types[&arg_expr]),
        solver.arena.follow(expected_lambda)
    );
}

#[test]
fn call_through_call_metamethod_prepends_the_subject() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // callable = setmetatable({}, {__call = (self, number) -> string})
    let mm_params = arena.pack(vec![TypeId::ANY, TypeId::NUMBER]);
    let mm_rets = arena.pack(vec![TypeId::STRING]);
    let mm = arena.add(TypeData::Function(FunctionType::new(mm_params, mm_rets)));

    let call_atom = names.intern("__call");
    let mut meta = TableType::new(TableState::Sealed, ScopeArena::ROOT);
    meta.props.push(TableProp::rw(call_atom, mm));
    let meta = arena.add(TypeData::Table(meta));

    let inner = arena.add(TypeData::Table(TableType::new(
        TableState::Sealed,
        ScopeArena::ROOT,
    )));
    let callable = arena.add(TypeData::Metatable(MetatableType {
        table: inner,
        metatable: meta,
        synthetic_name: None,
    }));

    let call_args = arena.pack(vec![TypeId::NUMBER]);
    let result = arena.add_pack(PackData::Blocked { owner: None });

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Call {
            function: callable,
            args: call_args,
            result,
            call_site: None,
            discriminants: Vec::new(),
        })],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());
    let resolved = solver.arena.first(result).expect("one return value");
    assert_eq!(solver.arena.follow(resolved), TypeId::STRING);
}

fn format_magic(solver: &mut ConstraintSolver, ctx: &MagicFunctionContext) -> bool {
    // The declared return type is irrelevant; this callback decides.
    let rets = solver.arena.pack(vec![TypeId::STRING]);
    let result = solver.arena.follow_pack(ctx.result);
    *solver.arena.get_pack_mut(result) = PackData::Bound(rets);
    true
}

#[test]
fn magic_function_overrides_standard_resolution() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    let params = arena.pack(vec![TypeId::STRING]);
    let rets = arena.pack(vec![TypeId::NUMBER]);
    let mut ft = FunctionType::new(params, rets);
    ft.magic = Some(format_magic);
    let f = arena.add(TypeData::Function(ft));

    let call_args = arena.pack(vec![TypeId::STRING]);
    let result = arena.add_pack(PackData::Blocked { owner: None });

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Call {
            function: f,
            args: call_args,
            result,
            call_site: None,
            discriminants: Vec::new(),
        })],
    );

    assert!(solver.is_done());
    let resolved = solver.arena.first(result).expect("one return value");
    assert_eq!(solver.arena.follow(resolved), TypeId::STRING);
}

#[test]
fn overload_selection_picks_the_matching_intersection_arm() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    // f : ((string) -> string) & ((number) -> number), called with a number
    let s_params = arena.pack(vec![TypeId::STRING]);
    let s_rets = arena.pack(vec![TypeId::STRING]);
    let string_arm = arena.add(TypeData::Function(FunctionType::new(s_params, s_rets)));

    let n_params = arena.pack(vec![TypeId::NUMBER]);
    let n_rets = arena.pack(vec![TypeId::NUMBER]);
    let number_arm = arena.add(TypeData::Function(FunctionType::new(n_params, n_rets)));

    let f = arena.add(TypeData::Intersection(vec![string_arm, number_arm]));

    let call_args = arena.pack(vec![TypeId::NUMBER]);
    let result = arena.add_pack(PackData::Blocked { owner: None });

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Call {
            function: f,
            args: call_args,
            result,
            call_site: None,
            discriminants: Vec::new(),
        })],
    );

    assert!(solver.is_done());
    let resolved = solver.arena.first(result).expect("one return value");
    assert_eq!(solver.arena.follow(resolved), TypeId::NUMBER);
}

#[test]
fn blocked_discriminants_are_pinned_during_call_dispatch() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    let params = arena.pack(vec![TypeId::NUMBER]);
    let f = arena.add(TypeData::Function(FunctionType::new(
        params,
        TypePackId::EMPTY,
    )));

    let discriminant = arena.fresh_blocked(None);
    let call_args = arena.pack(vec![TypeId::NUMBER]);
    let result = arena.add_pack(PackData::Blocked { owner: None });

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Call {
            function: f,
            args: call_args,
            result,
            call_site: None,
            discriminants: vec![Some(discriminant), None],
        })],
    );

    assert!(solver.is_done());
    assert_eq!(solver.arena.follow(discriminant), TypeId::ANY);
}

#[test]
fn forced_pass_breaks_a_free_table_iteration_deadlock() {
    let mut arena = TypeArena::new();
    let scopes = ScopeArena::new();
    let names = NameInterner::new();

    // Iterating a free table blocks, hoping another constraint seals it;
    // with nothing else in flight, the forced pass must push through.
    let mut table = TableType::new(TableState::Free, ScopeArena::ROOT);
    table.indexer = Some(TableIndexer {
        key_ty: TypeId::NUMBER,
        value_ty: TypeId::STRING,
    });
    let table = arena.add(TypeData::Table(table));

    let k = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 1,
    }));
    let v = arena.add(TypeData::Local(LocalType {
        domain: TypeId::NEVER,
        block_count: 1,
    }));

    let iterator = arena.pack(vec![table]);
    let variables = arena.pack(vec![k, v]);

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![constraint(ConstraintKind::Iterable {
            iterator,
            variables,
            next_expr: None,
        })],
    );

    assert!(solver.is_done());
    assert_eq!(solver.arena.follow(k), TypeId::NUMBER);
    assert_eq!(solver.arena.follow(v), TypeId::STRING);
}

#[test]
fn metatable_alias_instantiations_do_not_share_decorated_tables() {
    let mut arena = TypeArena::new();
    let mut scopes = ScopeArena::new();
    let mut names = NameInterner::new();

    // type WithMeta<T> = setmetatable({}, {tag: T}): the generic lives only
    // in the metatable, so substitution rebuilds the wrapper while the inner
    // table id survives from the alias body.
    let t = arena.add(TypeData::Generic(GenericType {
        name: names.intern("T"),
    }));
    let tag = names.intern("tag");

    let shared_inner = arena.add(TypeData::Table(TableType::new(
        TableState::Sealed,
        ScopeArena::ROOT,
    )));
    let mut meta = TableType::new(TableState::Sealed, ScopeArena::ROOT);
    meta.props.push(TableProp::rw(tag, t));
    let meta = arena.add(TypeData::Table(meta));
    let body = arena.add(TypeData::Metatable(MetatableType {
        table: shared_inner,
        metatable: meta,
        synthetic_name: None,
    }));

    let with_meta = names.intern("WithMeta");
    scopes.get_mut(ScopeArena::ROOT).type_aliases.insert(
        with_meta,
        TypeFunction {
            type_params: vec![GenericTypeParam {
                ty: t,
                default: None,
            }],
            type_pack_params: Vec::new(),
            body,
        },
    );

    let string_use = arena.add(TypeData::PendingExpansion(PendingExpansion {
        prefix: None,
        name: with_meta,
        type_args: vec![TypeId::STRING],
        pack_args: Vec::new(),
    }));
    let number_use = arena.add(TypeData::PendingExpansion(PendingExpansion {
        prefix: None,
        name: with_meta,
        type_args: vec![TypeId::NUMBER],
        pack_args: Vec::new(),
    }));

    let solver = run_solver(
        arena,
        scopes,
        names,
        vec![
            constraint(ConstraintKind::AliasExpansion { target: string_use }),
            constraint(ConstraintKind::AliasExpansion { target: number_use }),
        ],
    );

    assert!(solver.is_done());
    assert!(solver.errors.is_empty());

    let inner_params = |target: TypeId| -> Vec<TypeId> {
        let TypeData::Metatable(mt) = solver.arena.get(solver.arena.follow(target)) else {
            panic!("expected the expansion to stay a metatable");
        };
        let TypeData::Table(tt) = solver.arena.get(solver.arena.follow(mt.table)) else {
            panic!("expected a table under the metatable");
        };
        tt.instantiated_type_params.clone()
    };

    // Each instantiation decorates its own copy of the inner table.
    assert_eq!(inner_params(string_use), vec![TypeId::STRING]);
    assert_eq!(inner_params(number_use), vec![TypeId::NUMBER]);

    // The alias definition's own table is left untouched.
    let TypeData::Table(original) = solver.arena.get(shared_inner) else {
        panic!("the alias body's table must survive");
    };
    assert!(original.instantiated_type_params.is_empty());
}
