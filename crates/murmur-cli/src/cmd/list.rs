//! `mm list`: show the feed with your reactions.

use chrono::{DateTime, Utc};
use clap::Args;
use murmur_core::error::LedgerError;
use murmur_core::feed::{self, FeedCursor, PageRequest, SortOrder};
use murmur_core::model::{PostWithState, ReactionKind, ReactionSet};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

use crate::cmd::{fail_ledger, open_board, resolve_user, single_line};
use crate::output::{OutputMode, Renderable, pretty_rule, render, render_list_to};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Sort order: recent (default) or hot.
    #[arg(short, long)]
    pub sort: Option<String>,

    /// Maximum posts to show (defaults to `feed.page_size`).
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Continue after this cursor (printed by the previous page).
    #[arg(long)]
    pub after: Option<String>,
}

/// One feed row as shown to the requesting user.
#[derive(Debug, Serialize)]
pub struct PostRow {
    #[serde(flatten)]
    pub post: PostWithState,
    pub age: String,
}

impl PostRow {
    fn new(post: PostWithState, now: DateTime<Utc>) -> Self {
        let age = feed::time_ago(post.post.created_at, now);
        Self { post, age }
    }
}

/// `up 3  down 1  laugh 2` with the caller's active kinds starred.
pub fn reaction_line(counts: &murmur_core::model::ReactionCounts, active: ReactionSet) -> String {
    ReactionKind::ALL
        .into_iter()
        .map(|kind| {
            let label = match kind {
                ReactionKind::Upvote => "up",
                ReactionKind::Downvote => "down",
                ReactionKind::Laugh => "laugh",
            };
            let star = if active.contains(kind) { "*" } else { "" };
            format!("{label}{star} {}", counts.get(kind))
        })
        .collect::<Vec<_>>()
        .join("  ")
}

impl Renderable for PostRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let post = &self.post.post;
        writeln!(w, "{}  · {}", post.id, self.age)?;
        for line in post.content.lines() {
            writeln!(w, "  {line}")?;
        }
        writeln!(w, "  {}", reaction_line(&post.counts, self.post.active))?;
        pretty_rule(w)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let post = &self.post.post;
        let active = if self.post.active.is_empty() {
            "-".to_string()
        } else {
            self.post
                .active
                .iter()
                .map(ReactionKind::as_str)
                .collect::<Vec<_>>()
                .join(",")
        };
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            post.id,
            self.age,
            post.counts.upvotes,
            post.counts.downvotes,
            post.counts.laughs,
            active,
            single_line(&post.content)
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "AGE", "UP", "DOWN", "LAUGH", "MINE", "CONTENT"]
    }
}

#[derive(Debug, Serialize)]
struct FeedOutput {
    sort: SortOrder,
    posts: Vec<PostRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

pub fn run_list(
    args: &ListArgs,
    as_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let board = open_board(project_root, output)?;
    let sort = match args.sort.as_deref() {
        Some(raw) => raw.parse::<SortOrder>().map_err(|err| fail_ledger(output, err))?,
        None => board.config.feed.default_sort,
    };
    let after = args
        .after
        .as_deref()
        .map(str::parse::<FeedCursor>)
        .transpose()
        .map_err(|err| fail_ledger(output, err))?;
    let limit = args.limit.unwrap_or(board.config.feed.page_size);
    let user = resolve_user(as_flag, output)?;

    let (posts, next) = match sort {
        SortOrder::Recent => {
            let page = board
                .ledger
                .list_page(
                    &user,
                    &PageRequest {
                        after,
                        limit: Some(limit),
                    },
                )
                .map_err(|err| fail_ledger(output, err))?;
            (page.posts, page.next)
        }
        SortOrder::Hot => {
            if after.is_some() {
                return Err(fail_ledger(
                    output,
                    LedgerError::InvalidInput("--after only applies to the recent order".into()),
                ));
            }
            let mut posts = board
                .ledger
                .list_with_user_state(&user)
                .map_err(|err| fail_ledger(output, err))?;
            feed::sort_posts(&mut posts, SortOrder::Hot);
            posts.truncate(limit);
            (posts, None)
        }
    };

    let now = Utc::now();
    let payload = FeedOutput {
        sort,
        posts: posts.into_iter().map(|p| PostRow::new(p, now)).collect(),
        next: next.map(|cursor| cursor.to_string()),
    };

    render(output, &payload, |f, w| {
        if f.posts.is_empty() && output == OutputMode::Pretty {
            writeln!(w, "No posts yet. Start one with `mm post <text>`.")?;
        }
        render_list_to(&f.posts, output, w)?;
        if let Some(next) = &f.next {
            writeln!(w, "more: mm list --after {next}")?;
        }
        Ok(())
    })
}
