//! Two-phase resolution of a whole document tree.
//!
//! Local phase, per document and in parallel: outline, index, rewrite with
//! the document's own targets. Then a barrier builds the [`TreeIndex`] once.
//! Global phase, again in parallel and read-only against that index: rewrite
//! every reference the local phase left in place.

use std::num::NonZeroUsize;

use tracing::{debug, info};

use crate::diagnostics::Diagnostic;
use crate::index::{DocumentIndex, TreeIndex};
use crate::outline::build_outline;
use crate::rewrite::Rewriter;
use crate::tree::{Document, DocumentTreeRoot};

/// Output of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// One entry per invalid element, in tree order.
    pub diagnostics: Vec<Diagnostic>,
    /// The rewritten tree.
    pub root: DocumentTreeRoot,
}

/// Resolve every reference in `root`, using all available cores.
pub fn resolve(root: DocumentTreeRoot) -> Resolution {
    let workers = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    return resolve_with_workers(root, workers);
}

/// Resolve every reference in `root` on at most `workers` threads.
///
/// The result does not depend on the worker count.
pub fn resolve_with_workers(root: DocumentTreeRoot, workers: usize) -> Resolution {
    let (skeleton, documents) = root.detach_documents();
    debug!(documents = documents.len(), workers, "local phase");
    let (documents, local_diagnostics): (Vec<Document>, Vec<Vec<Diagnostic>>) =
        run_parallel(documents, workers, &local_pass).into_iter().unzip();

    let root = skeleton.attach_documents(documents);
    let tree = TreeIndex::build(&root);

    let (skeleton, documents) = root.detach_documents();
    debug!(documents = documents.len(), "global phase");
    let (documents, global_diagnostics): (Vec<Document>, Vec<Vec<Diagnostic>>) =
        run_parallel(documents, workers, &|document: Document| return global_pass(document, &tree))
            .into_iter()
            .unzip();

    let diagnostics: Vec<Diagnostic> = local_diagnostics
        .into_iter()
        .zip(global_diagnostics)
        .flat_map(|(local, global)| return local.into_iter().chain(global))
        .collect();
    info!(
        documents = documents.len(),
        diagnostics = diagnostics.len(),
        "resolution finished"
    );

    return Resolution {
        diagnostics,
        root: skeleton.attach_documents(documents),
    };
}

/// Outline a document and resolve what it can on its own.
fn local_pass(document: Document) -> (Document, Vec<Diagnostic>) {
    let Document { config, content, path } = document;
    let content = build_outline(content, config.first_header_as_title);
    let index = DocumentIndex::build(&content);
    let (content, diagnostics) = Rewriter::new(&path, &config, &index, None).run(content);
    debug!(document = %path, diagnostics = diagnostics.len(), "local pass done");
    return (Document::new(path, content, config), diagnostics);
}

/// Resolve the references a document left for the tree-wide pass.
fn global_pass(document: Document, tree: &TreeIndex) -> (Document, Vec<Diagnostic>) {
    let Document { config, content, path } = document;
    let index = DocumentIndex::build(&content);
    let (content, diagnostics) = Rewriter::new(&path, &config, &index, Some(tree)).run(content);
    return (Document::new(path, content, config), diagnostics);
}

/// Apply `job` to every item on a scoped worker pool and return the results
/// in input order. Runs inline for a single worker or a single item.
fn run_parallel<T, R, F>(items: Vec<T>, workers: usize, job: &F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let count = items.len();
    let workers = workers.min(count);
    if workers <= 1 {
        return items.into_iter().map(job).collect();
    }

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, T)>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, R)>();
    for item in items.into_iter().enumerate() {
        // Receiver is alive until the end of this function.
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            scope.spawn(move || {
                for (ordinal, item) in jobs {
                    if done.send((ordinal, job(item))).is_err() {
                        return;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut results: Vec<(usize, R)> = done_rx.into_iter().collect();
    results.sort_by_key(|(ordinal, _)| return *ordinal);
    return results.into_iter().map(|(_, result)| return result).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_results_keep_input_order() {
        let items: Vec<usize> = (0..50).collect();
        let doubled = run_parallel(items, 4, &|n: usize| return n.saturating_mul(2));
        assert_eq!(doubled, (0..50).map(|n: usize| return n.saturating_mul(2)).collect::<Vec<_>>());
    }

    #[test]
    fn single_worker_runs_inline() {
        let out = run_parallel(vec!["a", "b"], 1, &|s: &str| return s.to_uppercase());
        assert_eq!(out, ["A", "B"]);
    }
}
