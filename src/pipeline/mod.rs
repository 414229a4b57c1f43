use crate::classify::{human_count, Classifier, DebugFilter, Message};
use crate::config::DateRange;
use crate::source::{ApiError, TranscriptSource};
use crate::tally::CategoryTally;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, info};

/// Everything a run needs, passed in explicitly.
pub struct RunSettings<'a> {
    pub project_id: &'a str,
    pub range: DateRange,
    pub categories: &'a [String],
    pub filter: &'a DebugFilter,
    /// Upper bound on concurrent fetches. Clamped to at least 1.
    pub workers: usize,
}

/// One classified transcript, ready for the per-transcript writers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTranscript {
    pub id: String,
    pub messages: Vec<Message>,
}

/// Result of fetching and classifying every transcript in a range.
#[derive(Debug)]
pub struct Harvest {
    /// In listing order.
    pub transcripts: Vec<ClassifiedTranscript>,
    pub human_count: u64,
    pub tally: CategoryTally,
}

/// A worker's share of the run: indexed results plus its own partial
/// counters, merged after all workers have joined.
struct Partial {
    transcripts: Vec<(usize, ClassifiedTranscript)>,
    human_count: u64,
    tally: CategoryTally,
}

/// Shared state for the fetch workers. Indices into `ids` are handed out
/// through `next`; `abort` is raised by the first worker that fails.
struct Work<'a> {
    source: &'a dyn TranscriptSource,
    settings: &'a RunSettings<'a>,
    classifier: &'a Classifier<'a>,
    ids: &'a [String],
    next: AtomicUsize,
    abort: AtomicBool,
}

impl Work<'_> {
    fn run(&self, tally: CategoryTally) -> Result<Partial, ApiError> {
        let mut partial = Partial {
            transcripts: Vec::new(),
            human_count: 0,
            tally,
        };
        while !self.abort.load(Ordering::Relaxed) {
            let i = self.next.fetch_add(1, Ordering::Relaxed);
            let Some(id) = self.ids.get(i) else { break };
            let turns = match self.source.transcript_turns(self.settings.project_id, id) {
                Ok(turns) => turns,
                Err(e) => {
                    self.abort.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            };
            let messages = self.classifier.classify(&turns);
            debug!(
                transcript_id = %id,
                turns = turns.len(),
                messages = messages.len(),
                "classified transcript"
            );
            partial.human_count += human_count(&messages);
            partial.tally.scan_messages(&messages);
            partial.transcripts.push((
                i,
                ClassifiedTranscript {
                    id: id.clone(),
                    messages,
                },
            ));
        }
        Ok(partial)
    }
}

/// List, fetch, and classify all transcripts for the range.
///
/// Fetches run on up to `settings.workers` scoped threads. The first fetch
/// error stops the others from picking up new transcripts and is returned;
/// nothing partial escapes.
pub fn harvest(
    source: &dyn TranscriptSource,
    settings: &RunSettings<'_>,
) -> Result<Harvest, ApiError> {
    let ids = source.list_transcript_ids(settings.project_id, &settings.range)?;
    let empty = CategoryTally::new(settings.categories.iter().cloned());
    info!(
        count = ids.len(),
        categories = empty.len(),
        range = %settings.range,
        "listed transcripts"
    );

    let classifier = Classifier::new(settings.filter);
    let workers = settings.workers.clamp(1, ids.len().max(1));

    let work = Work {
        source,
        settings,
        classifier: &classifier,
        ids: &ids,
        next: AtomicUsize::new(0),
        abort: AtomicBool::new(false),
    };

    let results: Vec<Result<Partial, ApiError>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(|| work.run(empty.empty_like())));
        }
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut indexed = Vec::with_capacity(ids.len());
    let mut total_humans = 0;
    let mut tally = empty;
    for result in results {
        let partial = result?;
        indexed.extend(partial.transcripts);
        total_humans += partial.human_count;
        tally.merge(&partial.tally);
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(Harvest {
        transcripts: indexed.into_iter().map(|(_, t)| t).collect(),
        human_count: total_humans,
        tally,
    })
}

#[cfg(test)]
mod tests;
