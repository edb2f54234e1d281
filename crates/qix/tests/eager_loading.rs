#![allow(dead_code)]

use qix::{Ctx, Db, Entity, Model, Registry, SqliteSource};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "authors")]
struct Author {
    #[orm(db = "id,pk,auto")]
    id: i64,
    name: String,
    #[orm(rel = "hasMany,foreignKey:author_id")]
    books: Vec<Book>,
    #[orm(rel = "hasOne,foreignKey:author_id")]
    bio: Option<Bio>,
}

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "books")]
struct Book {
    #[orm(db = "id,pk,auto")]
    id: i64,
    author_id: i64,
    title: String,
    year: i64,
    #[orm(rel = "belongsTo,foreignKey:author_id")]
    author: Option<Box<Author>>,
    #[orm(rel = "manyToMany,pivot:book_genres,pivotFk:book_id,pivotRfk:genre_id")]
    genres: Vec<Genre>,
}

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "bios")]
struct Bio {
    #[orm(db = "id,pk,auto")]
    id: i64,
    author_id: i64,
    text: String,
}

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "genres")]
struct Genre {
    #[orm(db = "id,pk")]
    id: i64,
    name: String,
}

const SCHEMA: &str = "
    CREATE TABLE authors (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
    CREATE TABLE books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        author_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        year INTEGER NOT NULL
    );
    CREATE TABLE bios (id INTEGER PRIMARY KEY AUTOINCREMENT, author_id INTEGER NOT NULL, text TEXT NOT NULL);
    CREATE TABLE genres (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE book_genres (book_id INTEGER NOT NULL, genre_id INTEGER NOT NULL);

    INSERT INTO authors (name) VALUES ('le guin'), ('herbert'), ('chiang');
    INSERT INTO books (author_id, title, year) VALUES
        (1, 'the dispossessed', 1974),
        (1, 'the lathe of heaven', 1971),
        (2, 'dune', 1965);
    INSERT INTO bios (author_id, text) VALUES (1, 'ursula'), (2, 'frank');
    INSERT INTO genres (id, name) VALUES (1, 'sf'), (2, 'utopia'), (3, 'philosophy');
    INSERT INTO book_genres (book_id, genre_id) VALUES (1, 1), (1, 2), (2, 1), (3, 1), (3, 3);
";

fn setup() -> Db {
    let source = SqliteSource::open_in_memory().unwrap();
    source.execute_batch(SCHEMA).unwrap();
    Db::new(source).with_registry(Arc::new(Registry::new()))
}

#[test]
fn has_many_and_has_one_are_attached() {
    let db = setup();
    let ctx = Ctx::background();
    let authors = Model::<Author>::new(&db).unwrap().with(["books", "bio"]);

    let query = authors.query().order_by("id", "ASC");
    let loaded = authors.get(&ctx, query).unwrap();
    assert_eq!(loaded.len(), 3);

    let mut titles: Vec<&str> = loaded[0].books.iter().map(|b| b.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, ["the dispossessed", "the lathe of heaven"]);
    assert_eq!(loaded[1].books.len(), 1);
    assert!(loaded[2].books.is_empty());

    assert_eq!(loaded[0].bio.as_ref().unwrap().text, "ursula");
    assert!(loaded[2].bio.is_none());
}

#[test]
fn belongs_to_loads_boxed_parents() {
    let db = setup();
    let ctx = Ctx::background();
    let books = Model::<Book>::new(&db).unwrap().with(["author"]);

    let loaded = books.all(&ctx).unwrap();
    for book in &loaded {
        let author = book.author.as_ref().unwrap();
        assert_eq!(author.id, book.author_id);
    }
    let dune = loaded.iter().find(|b| b.title == "dune").unwrap();
    assert_eq!(dune.author.as_ref().unwrap().name, "herbert");
}

#[test]
fn many_to_many_goes_through_the_pivot() {
    let db = setup();
    let ctx = Ctx::background();
    let books = Model::<Book>::new(&db).unwrap().with(["genres"]);

    let loaded = books.get(&ctx, books.query().order_by("id", "ASC")).unwrap();
    let mut first: Vec<&str> = loaded[0].genres.iter().map(|g| g.name.as_str()).collect();
    first.sort_unstable();
    assert_eq!(first, ["sf", "utopia"]);
    assert_eq!(loaded[1].genres.len(), 1);
    assert_eq!(loaded[2].genres.len(), 2);
}

#[test]
fn customized_relation_query() {
    let db = setup();
    let ctx = Ctx::background();
    let authors = Model::<Author>::new(&db)
        .unwrap()
        .with_query("books", |q| q.and_where("year", ">", 1972));

    let ann = authors.find(&ctx, 1).unwrap();
    assert_eq!(ann.books.len(), 1);
    assert_eq!(ann.books[0].title, "the dispossessed");
}

#[test]
fn preload_into_fetched_entities() {
    let db = setup();
    let ctx = Ctx::background();
    let authors = Model::<Author>::new(&db).unwrap();

    let mut herbert = authors.find(&ctx, 2).unwrap();
    assert!(herbert.books.is_empty());
    authors.preload_one(&ctx, &mut herbert, "books").unwrap();
    assert_eq!(herbert.books[0].title, "dune");

    let mut all = authors.all(&ctx).unwrap();
    authors
        .preload_with(&ctx, &mut all, "books", |q| q.order_by("year", "DESC"))
        .unwrap();
    let le_guin = all.iter().find(|a| a.id == 1).unwrap();
    assert_eq!(le_guin.books[0].year, 1974);
}

#[test]
fn unknown_relation_is_reported() {
    let db = setup();
    let ctx = Ctx::background();
    let authors = Model::<Author>::new(&db).unwrap().with(["reviews"]);
    let err = authors.all(&ctx).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn relation_query_helpers() {
    let db = setup();
    let ctx = Ctx::background();
    let authors = Model::<Author>::new(&db).unwrap();
    let books = Model::<Book>::new(&db).unwrap();

    let le_guin = authors.find(&ctx, 1).unwrap();
    let owned = authors
        .has_many::<Book>(&le_guin, Some("author_id"), None)
        .unwrap()
        .get(&ctx)
        .unwrap();
    assert_eq!(owned.len(), 2);

    let dune = books.find(&ctx, 3).unwrap();
    let writer = books
        .belongs_to::<Author>(&dune, Some("author_id"), None)
        .unwrap()
        .first(&ctx)
        .unwrap()
        .unwrap();
    assert_eq!(writer.try_get::<String>("name").unwrap(), "herbert");

    let genres = books
        .belongs_to_many::<Genre>(&dune, Some("book_genres"), Some("book_id"), Some("genre_id"))
        .unwrap()
        .get(&ctx)
        .unwrap();
    assert_eq!(genres.len(), 2);
}

#[test]
fn register_all_finds_derived_entities() {
    let registry = Registry::new();
    let count = registry.register_all().unwrap();
    assert!(count >= 4);
    assert!(registry.contains::<Author>());
    assert!(registry.contains::<Genre>());
}
