//! Parser tests.

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(source: &str) -> String {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap_err().to_string()
    }

    fn parse_value(source: &str) -> Expr {
        let program = parse(&format!("let x = {}", source));
        match program.statements.into_iter().next().unwrap().kind {
            StmtKind::Let { mut values, .. } => values.remove(0),
            _ => panic!("Expected let statement"),
        }
    }

    #[test]
    fn test_binary_expr() {
        let expr = parse_value("1 + 2");
        match expr.kind {
            ExprKind::Binary { operator, .. } => assert_eq!(operator, BinaryOp::Add),
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 should parse as 1 + (2 * 3)
        let expr = parse_value("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary {
                operator: BinaryOp::Add,
                right,
                ..
            } => match right.kind {
                ExprKind::Binary {
                    operator: BinaryOp::Multiply,
                    ..
                } => {}
                _ => panic!("Expected multiply on right"),
            },
            _ => panic!("Expected add at top"),
        }
    }

    #[test]
    fn test_bitwise_binds_looser_than_equality() {
        let expr = parse_value("a & b == c");
        match expr.kind {
            ExprKind::Binary {
                operator: BinaryOp::BitAnd,
                right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    operator: BinaryOp::Equal,
                    ..
                }
            )),
            _ => panic!("Expected & at top"),
        }
    }

    #[test]
    fn test_ternary() {
        let expr = parse_value("a > 1 ? 'big' : 'small'");
        assert!(matches!(expr.kind, ExprKind::Ternary { .. }));
    }

    #[test]
    fn test_attribute_chain_and_call() {
        let program = parse("a.b[1](2, 3)");
        match &program.statements[0].kind {
            StmtKind::Expression(Expr {
                kind: ExprKind::Call { callee, arguments },
                ..
            }) => {
                assert_eq!(arguments.len(), 2);
                assert!(matches!(callee.kind, ExprKind::Index { .. }));
            }
            other => panic!("Expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_map_literal_keys() {
        let expr = parse_value("{name: 'x', 'k': 1, 2: true, true: nil}");
        match expr.kind {
            ExprKind::Map(entries) => {
                let keys: Vec<Literal> = entries.into_iter().map(|(k, _)| k).collect();
                assert_eq!(
                    keys,
                    vec![
                        Literal::String("name".to_string()),
                        Literal::String("k".to_string()),
                        Literal::Int(2),
                        Literal::Bool(true),
                    ]
                );
            }
            _ => panic!("Expected map literal"),
        }
    }

    #[test]
    fn test_multiline_literals() {
        let expr = parse_value("[\n  1,\n  2\n]");
        assert!(matches!(expr.kind, ExprKind::Array(ref v) if v.len() == 2));
        let expr = parse_value("{\n  a: 1,\n  b: 2\n}");
        assert!(matches!(expr.kind, ExprKind::Map(ref v) if v.len() == 2));
    }

    #[test]
    fn test_let_pads_and_rejects_extra_values() {
        let program = parse("let a, b = 1");
        match &program.statements[0].kind {
            StmtKind::Let { names, values } => {
                assert_eq!(names, &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(values.len(), 1);
            }
            _ => panic!("Expected let"),
        }
        assert!(parse_err("let a = 1, 2").contains("assignment mismatch"));
    }

    #[test]
    fn test_assignment_arity() {
        parse("a, b = f()");
        assert!(parse_err("a, b = 1").contains("assignment mismatch"));
    }

    #[test]
    fn test_compound_assignment() {
        let program = parse("a.b += 2");
        match &program.statements[0].kind {
            StmtKind::Assign {
                targets, operator, ..
            } => {
                assert_eq!(*operator, AssignOp::Add);
                assert!(matches!(targets[0].kind, ExprKind::Index { .. }));
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse_err("f().x = 1").contains("Invalid assignment target"));
    }

    #[test]
    fn test_increment_statements() {
        let program = parse("i++\n--j");
        let prefixes: Vec<bool> = program
            .statements
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Expression(Expr {
                    kind: ExprKind::Increment { prefix, .. },
                    ..
                }) => *prefix,
                _ => panic!("Expected increment"),
            })
            .collect();
        assert_eq!(prefixes, vec![false, true]);
    }

    #[test]
    fn test_if_elif_else_across_lines() {
        let program = parse("if (a) {\n  x = 1\n}\nelif (b) {\n  x = 2\n}\nelse {\n  x = 3\n}");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].kind {
            StmtKind::If { branches } => {
                assert_eq!(branches.len(), 3);
                assert_eq!(branches[2].0.kind, ExprKind::BoolLiteral(true));
            }
            _ => panic!("Expected if"),
        }
    }

    #[test]
    fn test_for_header() {
        let program = parse("for (let i = 0; i < 10; i++) { print(i) }");
        match &program.statements[0].kind {
            StmtKind::For {
                init,
                condition,
                post,
                body,
            } => {
                assert!(init.is_some());
                assert!(condition.is_some());
                assert!(post.is_some());
                assert_eq!(body.len(), 1);
            }
            _ => panic!("Expected for"),
        }
    }

    #[test]
    fn test_switch() {
        let program =
            parse("switch (x) {\ncase 1, 2:\n  a = 1\n  fallthrough\ncase 3:\n  a = 2\ndefault:\n  a = 3\n}");
        match &program.statements[0].kind {
            StmtKind::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].values.len(), 2);
                assert_eq!(cases[0].body.len(), 2);
                assert!(default.is_some());
            }
            _ => panic!("Expected switch"),
        }
    }

    #[test]
    fn test_try_catch() {
        let program = parse("try {\n  throw(1)\n}\ncatch (e) {\n  print(e)\n}");
        match &program.statements[0].kind {
            StmtKind::Try { catch_var, .. } => assert_eq!(catch_var.as_deref(), Some("e")),
            _ => panic!("Expected try"),
        }
    }

    #[test]
    fn test_labels_and_goto() {
        let program = parse("top:\ngoto top");
        assert_eq!(program.statements[0].kind, StmtKind::Label("top".to_string()));
        assert_eq!(program.statements[1].kind, StmtKind::Goto("top".to_string()));
    }

    #[test]
    fn test_named_functions_are_hoisted() {
        let program = parse("func add(a, b = 1, c = -2) { return a + b + c }\nprint(add(1))");
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.statements.len(), 1);
        let params = &program.functions[0].func.params;
        assert_eq!(params[1].default, Some(Literal::Int(1)));
        assert_eq!(params[2].default, Some(Literal::Int(-2)));
    }

    #[test]
    fn test_nested_named_function_becomes_let() {
        let program = parse("func outer() {\n  func inner() {}\n  return inner\n}");
        match &program.functions[0].func.body[0].kind {
            StmtKind::Let { names, values } => {
                assert_eq!(names, &vec!["inner".to_string()]);
                assert!(matches!(values[0].kind, ExprKind::Function(_)));
            }
            _ => panic!("Expected let"),
        }
    }

    #[test]
    fn test_variadic_parameter() {
        let program = parse("func f(a, ...rest) {}");
        assert_eq!(program.functions[0].func.variadic.as_deref(), Some("rest"));
        assert!(parse_err("func g(a = 1, ...rest) {}").contains("variadic"));
        assert!(parse_err("func h(a = 1, b) {}").contains("without default"));
    }

    #[test]
    fn test_class_declaration() {
        let program = parse(
            "class Point {\n  x = 0\n  y = 0\n  __self(x, y) { this.x = x; this.y = y }\n  sum() { return this.x + this.y }\n}",
        );
        let class = &program.classes[0];
        assert_eq!(class.name, "Point");
        assert_eq!(class.fields.len(), 3);
        assert!(class.constructor.is_some());
    }

    #[test]
    fn test_enum_values() {
        let program = parse("enum {\n  A,\n  B = 5,\n  C\n}");
        assert_eq!(
            program.enums[0].variants,
            vec![
                ("A".to_string(), 0),
                ("B".to_string(), 5),
                ("C".to_string(), 6)
            ]
        );
    }

    #[test]
    fn test_imports_and_export() {
        let program = parse("import fs, \"./lib/util\" as f, u\nimport os\nlet x = 1\nexport x");
        let aliases: Vec<&str> = program.imports.iter().map(|i| i.alias.as_str()).collect();
        assert_eq!(aliases, vec!["f", "u", "os"]);
        assert_eq!(
            program.imports[1].source,
            ImportSource::File("./lib/util".to_string())
        );
        assert!(program.export.is_some());
    }

    #[test]
    fn test_statement_after_export_is_error() {
        assert!(parse_err("export 1\nlet x = 2").contains("after export"));
    }

    #[test]
    fn test_loop_statement_parses() {
        let program = parse("loop (let k, v : obj) { print(k) }");
        assert!(matches!(
            program.statements[0].kind,
            StmtKind::Loop { key: Some(_), .. }
        ));
    }
}
