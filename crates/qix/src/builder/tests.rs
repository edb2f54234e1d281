//! Rendering and execution tests for the builder.

use super::*;
use crate::testing::RecordingSource;

fn placeholder_count(sql: &str) -> usize {
    sql.matches('?').count()
}

#[test]
fn test_select_star() {
    assert_eq!(table("users").to_sql(), "SELECT * FROM users");
}

#[test]
fn test_select_columns_where_order() {
    let qb = table("users")
        .select(["id", "name"])
        .and_where("age", ">", 18)
        .order_by("name", "ASC");

    let (sql, bindings) = qb.build();
    assert_eq!(sql, "SELECT id, name FROM users WHERE age > ? ORDER BY name ASC");
    assert_eq!(bindings, vec![Value::Int(18)]);
}

#[test]
fn test_where_in() {
    let (sql, bindings) = table("users").where_in("id", [1, 2, 3]).build();
    assert_eq!(sql, "SELECT * FROM users WHERE id IN (?, ?, ?)");
    assert_eq!(bindings, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_empty_where_in_is_noop() {
    let qb = table("users").where_in("id", Vec::<i64>::new());
    assert_eq!(qb.to_sql(), "SELECT * FROM users");
    assert!(qb.bindings().is_empty());
}

#[test]
fn test_where_not_in_and_null_checks() {
    let (sql, bindings) = table("users")
        .where_not_in("role", ["admin", "root"])
        .where_null("deleted_at")
        .where_not_null("email")
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE role NOT IN (?, ?) AND deleted_at IS NULL AND email IS NOT NULL"
    );
    assert_eq!(bindings, vec![Value::from("admin"), Value::from("root")]);
}

#[test]
fn test_or_where_between_like() {
    let (sql, bindings) = table("users")
        .where_between("age", 18, 30)
        .or_where("vip", "=", true)
        .where_like("name", "a%")
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE age BETWEEN ? AND ? OR vip = ? AND name LIKE ?"
    );
    assert_eq!(
        bindings,
        vec![Value::Int(18), Value::Int(30), Value::Bool(true), Value::from("a%")]
    );
}

#[test]
fn test_where_column_and_raw() {
    let (sql, bindings) = table("orders")
        .where_column("shipped_at", ">", "created_at")
        .or_where_column("total", "=", "paid")
        .where_raw("price * qty > ?", vec![Value::Int(100)])
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM orders WHERE shipped_at > created_at OR total = paid AND price * qty > ?"
    );
    assert_eq!(bindings, vec![Value::Int(100)]);
}

#[test]
fn test_date_helpers() {
    let (sql, bindings) = table("events")
        .where_date("created_at", "=", "2024-01-15")
        .where_year("created_at", ">=", 2023)
        .where_month_in("created_at", [1, 2, 3])
        .where_day("created_at", "<", 10)
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM events WHERE DATE(created_at) = ? AND YEAR(created_at) >= ? \
         AND MONTH(created_at) IN (?, ?, ?) AND DAY(created_at) < ?"
    );
    assert_eq!(bindings.len(), 6);
    assert_eq!(placeholder_count(&sql), bindings.len());
}

#[test]
fn test_join_with_where() {
    let (sql, bindings) = table("users")
        .join_with("orders", |j| {
            j.where_column("users.id", "=", "orders.user_id")
                .and_where("orders.status", "=", "completed")
        })
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM users INNER JOIN orders ON users.id = orders.user_id AND orders.status = ?"
    );
    assert_eq!(bindings, vec![Value::from("completed")]);
}

#[test]
fn test_join_kinds() {
    let sql = table("users")
        .select(["users.*", "profiles.bio"])
        .join("orders", "users.id = orders.user_id")
        .left_join("profiles", "profiles.user_id = users.id")
        .right_join("teams", "teams.id = users.team_id")
        .cross_join("regions")
        .to_sql();
    assert_eq!(
        sql,
        "SELECT users.*, profiles.bio FROM users \
         INNER JOIN orders ON users.id = orders.user_id \
         LEFT JOIN profiles ON profiles.user_id = users.id \
         RIGHT JOIN teams ON teams.id = users.team_id \
         CROSS JOIN regions"
    );
}

#[test]
fn test_join_sub_bindings_precede_where() {
    // WHERE is added before the join, but the join renders first.
    let latest = table("orders")
        .select(["user_id", "MAX(created_at) AS last_order"])
        .and_where("status", "=", "paid")
        .group_by(["user_id"]);
    let (sql, bindings) = table("users")
        .and_where("users.active", "=", true)
        .join_sub(latest, "latest", "latest.user_id = users.id")
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM users INNER JOIN (SELECT user_id, MAX(created_at) AS last_order FROM orders \
         WHERE status = ? GROUP BY user_id) AS latest ON latest.user_id = users.id \
         WHERE users.active = ?"
    );
    assert_eq!(bindings, vec![Value::from("paid"), Value::Bool(true)]);
}

#[test]
fn test_group_having_order_limit_offset() {
    let (sql, bindings) = table("orders")
        .select(["user_id"])
        .sum("total")
        .and_where("status", "=", "paid")
        .group_by(["user_id"])
        .having("SUM(total)", ">", 100)
        .order_by("user_id", "DESC")
        .limit(10)
        .offset(20)
        .build();
    assert_eq!(
        sql,
        "SELECT user_id, SUM(total) FROM orders WHERE status = ? GROUP BY user_id \
         HAVING SUM(total) > ? ORDER BY user_id DESC LIMIT ? OFFSET ?"
    );
    // limit/offset bind after WHERE and HAVING
    assert_eq!(
        bindings,
        vec![Value::from("paid"), Value::Int(100), Value::Int(10), Value::Int(20)]
    );
}

#[test]
fn test_having_group() {
    let (sql, bindings) = table("orders")
        .count("*")
        .group_by(["user_id"])
        .having_group(|h| h.and_where("COUNT(*)", ">", 2).or_where("SUM(total)", ">", 500))
        .build();
    assert_eq!(
        sql,
        "SELECT COUNT(*) FROM orders GROUP BY user_id HAVING COUNT(*) > ? OR SUM(total) > ?"
    );
    assert_eq!(bindings, vec![Value::Int(2), Value::Int(500)]);
}

#[test]
fn test_aggregates() {
    let sql = table("orders")
        .count("id")
        .max("total")
        .min("total")
        .avg("total")
        .to_sql();
    assert_eq!(sql, "SELECT COUNT(id), MAX(total), MIN(total), AVG(total) FROM orders");
}

#[test]
fn test_union() {
    let staff = table("staff").and_where("department", "=", "sales");
    let (sql, bindings) = table("users").and_where("role", "=", "admin").union(staff).build();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE role = ? UNION SELECT * FROM staff WHERE department = ?"
    );
    assert_eq!(bindings, vec![Value::from("admin"), Value::from("sales")]);
}

#[test]
fn test_union_all() {
    let sql = table("a").union_all(table("b")).to_sql();
    assert_eq!(sql, "SELECT * FROM a UNION ALL SELECT * FROM b");
}

#[test]
fn test_nested_unions_are_rendered() {
    let inner = table("b")
        .and_where("x", "=", 2)
        .union_all(table("c").and_where("x", "=", 3));
    let (sql, bindings) = table("a").and_where("x", "=", 1).union(inner).build();
    assert_eq!(
        sql,
        "SELECT * FROM a WHERE x = ? UNION SELECT * FROM b WHERE x = ? \
         UNION ALL SELECT * FROM c WHERE x = ?"
    );
    assert_eq!(bindings, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_where_group_merges() {
    let (sql, bindings) = table("users")
        .and_where("active", "=", true)
        .where_group(|q| q.and_where("age", ">", 18).and_where("age", "<", 65))
        .or_where_group(|q| q.and_where("vip", "=", true))
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE active = ? AND age > ? AND age < ? OR vip = ?"
    );
    assert_eq!(bindings.len(), 4);
}

#[test]
fn test_where_nested_parenthesizes() {
    let (sql, bindings) = table("users")
        .and_where("active", "=", true)
        .where_nested(|q| q.and_where("role", "=", "admin").or_where("role", "=", "owner"))
        .build();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE active = ? AND (role = ? OR role = ?)"
    );
    assert_eq!(
        bindings,
        vec![Value::Bool(true), Value::from("admin"), Value::from("owner")]
    );
}

#[test]
fn test_where_exists_and_sub_select() {
    let orders = table("orders").where_column("orders.user_id", "=", "users.id");
    let counts = table("orders")
        .count("*")
        .where_column("orders.user_id", "=", "users.id")
        .and_where("orders.total", ">", 50);
    let (sql, bindings) = table("users")
        .select(["users.id"])
        .sub_select(counts, "big_orders")
        .where_exists(orders)
        .and_where("users.active", "=", 1)
        .build();
    assert_eq!(
        sql,
        "SELECT users.id, (SELECT COUNT(*) FROM orders WHERE orders.user_id = users.id \
         AND orders.total > ?) AS big_orders FROM users \
         WHERE EXISTS (SELECT * FROM orders WHERE orders.user_id = users.id) AND users.active = ?"
    );
    assert_eq!(bindings, vec![Value::Int(50), Value::Int(1)]);
}

#[test]
fn test_when_unless() {
    let filter: Option<&str> = Some("alice");
    let qb = table("users")
        .when(filter.is_some(), |q| q.and_where("name", "=", filter.unwrap_or_default()))
        .unless(true, |q| q.limit(5));
    assert_eq!(qb.to_sql(), "SELECT * FROM users WHERE name = ?");
}

#[test]
fn test_render_is_idempotent() {
    let qb = table("users")
        .and_where("age", ">", 18)
        .union(table("staff").and_where("age", ">", 30))
        .limit(5)
        .offset(10);
    let first = qb.build();
    let second = qb.build();
    assert_eq!(first, second);
    assert_eq!(placeholder_count(&first.0), first.1.len());
}

#[test]
fn test_placeholders_match_bindings_for_mixed_predicates() {
    let (sql, bindings) = table("t")
        .and_where("a", "=", 1)
        .where_in("b", [1, 2])
        .where_between("c", 1, 9)
        .where_null("d")
        .where_raw("e = ? OR e = ?", vec![Value::Int(1), Value::Int(2)])
        .where_nested(|q| q.and_where("f", "<", 3).where_not_in("g", ["x"]))
        .having("h", ">", 0)
        .limit(1)
        .build();
    assert_eq!(placeholder_count(&sql), bindings.len());
    assert_eq!(bindings.len(), 11);
}

#[test]
fn test_clone_is_independent() {
    let base = table("users").and_where("active", "=", true);
    let narrowed = base.clone().and_where("age", ">", 18);
    assert_eq!(base.bindings().len(), 1);
    assert_eq!(narrowed.bindings().len(), 2);
}

#[test]
fn test_debug_sql_interpolates() {
    let qb = table("users")
        .and_where("name", "=", "O'Brien")
        .where_raw("note <> '?'", vec![])
        .limit(3);
    assert_eq!(
        qb.debug_sql(),
        "SELECT * FROM users WHERE name = 'O''Brien' AND note <> '?' LIMIT 3"
    );
}

#[test]
fn test_write_sql() {
    let record = Record::new().set("name", "alice").set("age", 30);
    let qb = table("users");
    assert_eq!(
        qb.insert_sql(&record),
        (
            "INSERT INTO users (name, age) VALUES (?, ?)".to_string(),
            vec![Value::from("alice"), Value::Int(30)]
        )
    );

    let qb = table("users").and_where("id", "=", 7);
    let (sql, bindings) = qb.update_sql(&record);
    assert_eq!(sql, "UPDATE users SET name = ?, age = ? WHERE id = ?");
    assert_eq!(bindings, vec![Value::from("alice"), Value::Int(30), Value::Int(7)]);

    let (sql, bindings) = qb.delete_sql();
    assert_eq!(sql, "DELETE FROM users WHERE id = ?");
    assert_eq!(bindings, vec![Value::Int(7)]);
}

#[test]
fn test_batch_insert_sql() {
    let rows = vec![
        Record::new().set("name", "a").set("age", 1),
        Record::new().set("age", 2).set("name", "b"),
        Record::new().set("name", "c"),
    ];
    let (sql, bindings) = table("users").batch_insert_sql(&rows).unwrap();
    assert_eq!(sql, "INSERT INTO users (name, age) VALUES (?, ?), (?, ?), (?, ?)");
    assert_eq!(
        bindings,
        vec![
            Value::from("a"),
            Value::Int(1),
            Value::from("b"),
            Value::Int(2),
            Value::from("c"),
            Value::Null,
        ]
    );
    assert!(table("users").batch_insert_sql(&[]).is_none());
}

#[test]
fn test_bulk_update_sql() {
    let rows = vec![
        Record::new().set("id", 1).set("status", "a"),
        Record::new().set("id", 2).set("status", "b"),
    ];
    let (sql, bindings) = table("users").bulk_update_sql(&rows, "id").unwrap().unwrap();
    assert_eq!(
        sql,
        "UPDATE users SET status = CASE id WHEN ? THEN ? WHEN ? THEN ? END WHERE id IN (?, ?)"
    );
    assert_eq!(
        bindings,
        vec![
            Value::Int(1),
            Value::from("a"),
            Value::Int(2),
            Value::from("b"),
            Value::Int(1),
            Value::Int(2),
        ]
    );

    let missing_key = vec![Record::new().set("status", "a")];
    let err = table("users").bulk_update_sql(&missing_key, "id").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_detached_builder_cannot_execute() {
    let err = table("users").get(&Ctx::background()).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_executors_forward_to_source() {
    let source = RecordingSource::new();
    source.respond(&["id", "name"], vec![vec![Value::Int(1), Value::from("alice")]]);
    let db = Db::new(source.clone());
    let ctx = Ctx::background();

    let row = db.table("users").and_where("id", "=", 1).first(&ctx).unwrap().unwrap();
    assert_eq!(row.try_get::<String>("name").unwrap(), "alice");

    let id = db
        .table("users")
        .insert_get_id(&ctx, &Record::new().set("name", "bob"))
        .unwrap();
    assert_eq!(id, Some(1));

    let affected = db.table("users").and_where("id", "=", 1).delete(&ctx).unwrap();
    assert_eq!(affected, 1);

    assert_eq!(
        source.log(),
        vec![
            (
                "SELECT * FROM users WHERE id = ? LIMIT ?".to_string(),
                vec![Value::Int(1), Value::Int(1)]
            ),
            (
                "INSERT INTO users (name) VALUES (?)".to_string(),
                vec![Value::from("bob")]
            ),
            (
                "DELETE FROM users WHERE id = ?".to_string(),
                vec![Value::Int(1)]
            ),
        ]
    );
}

#[test]
fn test_source_errors_pass_through() {
    let source = RecordingSource::new();
    source.fail_when("SELECT");
    let db = Db::new(source);
    let err = db.table("users").get(&Ctx::background()).unwrap_err();
    assert!(matches!(err, OrmError::Execution(_)));
    assert!(err.to_string().starts_with("injected failure"));
}
