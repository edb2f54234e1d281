//! In-memory data source that records statements, for unit tests.

use crate::client::{DataSource, ExecResult, TxResource};
use crate::context::Ctx;
use crate::error::{OrmError, OrmResult};
use crate::row::{RowCursor, VecCursor};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
#[error("injected failure: {0}")]
pub(crate) struct InjectedError(pub String);

#[derive(Default)]
struct State {
    log: Vec<(String, Vec<Value>)>,
    responses: VecDeque<(Vec<String>, Vec<Vec<Value>>)>,
    failures: Vec<String>,
    next_id: i64,
}

/// Records every statement; queries answer from a queue of canned results.
#[derive(Clone, Default)]
pub(crate) struct RecordingSource {
    state: Arc<Mutex<State>>,
    transactions: bool,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions() -> Self {
        Self {
            transactions: true,
            ..Self::default()
        }
    }

    /// Queue the result of the next query.
    pub fn respond(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.lock().responses.push_back((columns, rows));
    }

    /// Fail every statement that starts with `prefix`.
    pub fn fail_when(&self, prefix: &str) {
        self.lock().failures.push(prefix.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn log(&self) -> Vec<(String, Vec<Value>)> {
        self.lock().log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, sql: &str, bindings: &[Value]) -> OrmResult<()> {
        let mut state = self.lock();
        state.log.push((sql.to_string(), bindings.to_vec()));
        if state.failures.iter().any(|p| sql.starts_with(p.as_str())) {
            return Err(OrmError::execution(InjectedError(sql.to_string())));
        }
        Ok(())
    }
}

impl DataSource for RecordingSource {
    fn query(&self, _ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        self.record(sql, bindings)?;
        let cursor = match self.lock().responses.pop_front() {
            Some((columns, rows)) => VecCursor::new(columns, rows),
            None => VecCursor::empty(),
        };
        Ok(Box::new(cursor))
    }

    fn execute(&self, _ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
        self.record(sql, bindings)?;
        let mut state = self.lock();
        state.next_id += 1;
        Ok(ExecResult {
            last_insert_id: Some(state.next_id),
            rows_affected: 1,
        })
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn begin(&self, _ctx: &Ctx) -> OrmResult<Arc<dyn TxResource>> {
        if !self.transactions {
            return Err(OrmError::capability("recording source has no transactions"));
        }
        self.record("BEGIN", &[])?;
        Ok(Arc::new(RecordingTx {
            source: self.clone(),
            done: AtomicBool::new(false),
        }))
    }
}

struct RecordingTx {
    source: RecordingSource,
    done: AtomicBool,
}

impl RecordingTx {
    fn ensure_open(&self) -> OrmResult<()> {
        if self.done.load(Ordering::SeqCst) {
            return Err(OrmError::transaction("transaction already finished", None));
        }
        Ok(())
    }
}

impl DataSource for RecordingTx {
    fn query(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<Box<dyn RowCursor>> {
        self.ensure_open()?;
        self.source.query(ctx, sql, bindings)
    }

    fn execute(&self, ctx: &Ctx, sql: &str, bindings: &[Value]) -> OrmResult<ExecResult> {
        self.ensure_open()?;
        self.source.execute(ctx, sql, bindings)
    }
}

impl TxResource for RecordingTx {
    fn commit(&self, _ctx: &Ctx) -> OrmResult<()> {
        self.ensure_open()?;
        self.done.store(true, Ordering::SeqCst);
        self.source.record("COMMIT", &[])
    }

    fn rollback(&self, _ctx: &Ctx) -> OrmResult<()> {
        self.ensure_open()?;
        self.done.store(true, Ordering::SeqCst);
        self.source.record("ROLLBACK", &[])
    }
}

/// Hand-written entities shared by unit tests.
pub(crate) mod fixtures {
    use crate::entity::{
        AttrDecl, Entity, EntityDecl, Related, TargetRef, assign_attr, assign_many,
        assign_optional, assign_optional_boxed, decode_attr, unknown_attr,
    };
    use crate::descriptor::EntityDescriptor;
    use crate::error::OrmResult;
    use crate::row::Row;
    use crate::value::Value;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct User {
        pub id: i64,
        pub name: String,
        pub posts: Vec<Post>,
        pub profile: Option<Profile>,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Post {
        pub id: i64,
        pub user_id: i64,
        pub title: String,
        pub user: Option<Box<User>>,
        pub tags: Vec<Tag>,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Profile {
        pub id: i64,
        pub user_id: i64,
        pub bio: String,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Tag {
        pub id: i64,
        pub name: String,
    }

    impl Entity for User {
        fn declaration() -> EntityDecl {
            EntityDecl::new("User")
                .table("users")
                .attr(AttrDecl::scalar("id").column("id,pk,auto"))
                .attr(AttrDecl::scalar("name"))
                .attr(
                    AttrDecl::collection("posts", TargetRef::of::<Post>())
                        .relation("hasMany,foreignKey:user_id"),
                )
                .attr(
                    AttrDecl::entity("profile", TargetRef::of::<Profile>())
                        .relation("hasOne,foreignKey:user_id"),
                )
        }

        fn from_row(row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Self> {
            let mut user = User::default();
            decode_attr(row, descriptor, "id", &mut user.id)?;
            decode_attr(row, descriptor, "name", &mut user.name)?;
            Ok(user)
        }

        fn get_attr(&self, attr: &str) -> Option<Value> {
            match attr {
                "id" => Some(self.id.into()),
                "name" => Some(self.name.clone().into()),
                _ => None,
            }
        }

        fn set_attr(&mut self, attr: &str, value: &Value) -> OrmResult<()> {
            match attr {
                "id" => assign_attr(&mut self.id, attr, value),
                "name" => assign_attr(&mut self.name, attr, value),
                _ => Err(unknown_attr("User", attr)),
            }
        }

        fn attach(&mut self, attr: &str, related: Related) -> OrmResult<()> {
            match attr {
                "posts" => assign_many(&mut self.posts, attr, related),
                "profile" => assign_optional(&mut self.profile, attr, related),
                _ => Err(unknown_attr("User", attr)),
            }
        }
    }

    impl Entity for Post {
        fn declaration() -> EntityDecl {
            EntityDecl::new("Post")
                .table("posts")
                .attr(AttrDecl::scalar("id").column("id,pk,auto"))
                .attr(AttrDecl::scalar("user_id"))
                .attr(AttrDecl::scalar("title"))
                .attr(AttrDecl::entity("user", TargetRef::of::<User>()))
                .attr(AttrDecl::collection("tags", TargetRef::of::<Tag>()).relation("manyToMany"))
        }

        fn from_row(row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Self> {
            let mut post = Post::default();
            decode_attr(row, descriptor, "id", &mut post.id)?;
            decode_attr(row, descriptor, "user_id", &mut post.user_id)?;
            decode_attr(row, descriptor, "title", &mut post.title)?;
            Ok(post)
        }

        fn get_attr(&self, attr: &str) -> Option<Value> {
            match attr {
                "id" => Some(self.id.into()),
                "user_id" => Some(self.user_id.into()),
                "title" => Some(self.title.clone().into()),
                _ => None,
            }
        }

        fn set_attr(&mut self, attr: &str, value: &Value) -> OrmResult<()> {
            match attr {
                "id" => assign_attr(&mut self.id, attr, value),
                "user_id" => assign_attr(&mut self.user_id, attr, value),
                "title" => assign_attr(&mut self.title, attr, value),
                _ => Err(unknown_attr("Post", attr)),
            }
        }

        fn attach(&mut self, attr: &str, related: Related) -> OrmResult<()> {
            match attr {
                "user" => assign_optional_boxed(&mut self.user, attr, related),
                "tags" => assign_many(&mut self.tags, attr, related),
                _ => Err(unknown_attr("Post", attr)),
            }
        }
    }

    impl Entity for Profile {
        fn declaration() -> EntityDecl {
            EntityDecl::new("Profile")
                .attr(AttrDecl::scalar("id").column("id,pk,auto"))
                .attr(AttrDecl::scalar("user_id"))
                .attr(AttrDecl::scalar("bio").column(",omitempty"))
        }

        fn from_row(row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Self> {
            let mut profile = Profile::default();
            decode_attr(row, descriptor, "id", &mut profile.id)?;
            decode_attr(row, descriptor, "user_id", &mut profile.user_id)?;
            decode_attr(row, descriptor, "bio", &mut profile.bio)?;
            Ok(profile)
        }

        fn get_attr(&self, attr: &str) -> Option<Value> {
            match attr {
                "id" => Some(self.id.into()),
                "user_id" => Some(self.user_id.into()),
                "bio" => Some(self.bio.clone().into()),
                _ => None,
            }
        }

        fn set_attr(&mut self, attr: &str, value: &Value) -> OrmResult<()> {
            match attr {
                "id" => assign_attr(&mut self.id, attr, value),
                "user_id" => assign_attr(&mut self.user_id, attr, value),
                "bio" => assign_attr(&mut self.bio, attr, value),
                _ => Err(unknown_attr("Profile", attr)),
            }
        }

        fn attach(&mut self, attr: &str, _related: Related) -> OrmResult<()> {
            Err(unknown_attr("Profile", attr))
        }
    }

    impl Entity for Tag {
        fn declaration() -> EntityDecl {
            EntityDecl::new("Tag")
                .table("tags")
                .attr(AttrDecl::scalar("id"))
                .attr(AttrDecl::scalar("name"))
        }

        fn from_row(row: &Row, descriptor: &EntityDescriptor) -> OrmResult<Self> {
            let mut tag = Tag::default();
            decode_attr(row, descriptor, "id", &mut tag.id)?;
            decode_attr(row, descriptor, "name", &mut tag.name)?;
            Ok(tag)
        }

        fn get_attr(&self, attr: &str) -> Option<Value> {
            match attr {
                "id" => Some(self.id.into()),
                "name" => Some(self.name.clone().into()),
                _ => None,
            }
        }

        fn set_attr(&mut self, attr: &str, value: &Value) -> OrmResult<()> {
            match attr {
                "id" => assign_attr(&mut self.id, attr, value),
                "name" => assign_attr(&mut self.name, attr, value),
                _ => Err(unknown_attr("Tag", attr)),
            }
        }

        fn attach(&mut self, attr: &str, _related: Related) -> OrmResult<()> {
            Err(unknown_attr("Tag", attr))
        }
    }
}
