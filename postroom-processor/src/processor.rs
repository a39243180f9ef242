//! The linear processor: an ordered chain of matcher/mailet stages.
//!
//! A processor is built open, stages are appended with [`Processor::add`],
//! and [`Processor::close`] seals the chain by appending a terminal stage
//! that finishes anything still in flight. Only a closed processor can
//! [`service`](Processor::service) envelopes; the sealed stage list is never
//! mutated again, so any number of `service` calls can run concurrently.

use std::{
    collections::VecDeque,
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use postroom_common::{Envelope, EnvelopeId, MailAddress, State, internal, pipeline};
use postroom_spool::SpoolStore;
use postroom_tracing::traced;

use crate::{
    config::{ProcessorConfig, StageConfig},
    error::{ConfigError, MailetError, ProcessorError, describe},
    loader::Loader,
    mailet::Mailet,
    matcher::{Inverted, MatchResult, Matcher, builtin::All},
    policy::{MailetPolicy, MatchPolicy},
};

/// A matcher/mailet pair with its exception policies.
pub struct Stage {
    matcher: Box<dyn Matcher>,
    mailet: Box<dyn Mailet>,
    on_match_exception: MatchPolicy,
    on_mailet_exception: MailetPolicy,
}

impl Stage {
    pub fn new(matcher: impl Matcher + 'static, mailet: impl Mailet + 'static) -> Self {
        Self::from_boxed(Box::new(matcher), Box::new(mailet))
    }

    pub fn from_boxed(matcher: Box<dyn Matcher>, mailet: Box<dyn Mailet>) -> Self {
        Self {
            matcher,
            mailet,
            on_match_exception: MatchPolicy::default(),
            on_mailet_exception: MailetPolicy::default(),
        }
    }

    #[must_use]
    pub fn on_match_exception(mut self, policy: MatchPolicy) -> Self {
        self.on_match_exception = policy;
        self
    }

    #[must_use]
    pub fn on_mailet_exception(mut self, policy: MailetPolicy) -> Self {
        self.on_mailet_exception = policy;
        self
    }

    /// Builds a stage from configuration, loading its units through `loader`.
    ///
    /// # Errors
    ///
    /// Conflicting matcher settings, blank policies, and load failures.
    pub fn from_config(
        processor: &str,
        index: usize,
        config: &StageConfig,
        loader: &Loader,
    ) -> Result<Self, ProcessorError> {
        let load_error = |source| ProcessorError::Load {
            processor: State::new(processor),
            source,
        };

        let matcher: Box<dyn Matcher> = match (&config.matcher, &config.not_match) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::MatcherConflict {
                    processor: processor.to_string(),
                    stage: index,
                }
                .into());
            }
            (Some(spec), None) => loader.load_matcher(spec).map_err(load_error)?,
            (None, Some(spec)) => Box::new(Inverted::new(
                loader.load_matcher(spec).map_err(load_error)?,
            )),
            (None, None) => Box::new(All),
        };

        let mailet = loader
            .load_mailet(&config.mailet, &config.params)
            .map_err(load_error)?;

        let blank = || ConfigError::EmptyPolicy {
            processor: processor.to_string(),
            stage: index,
        };

        let on_match_exception = config
            .on_match_exception
            .as_deref()
            .map(|value| MatchPolicy::parse(value).ok_or_else(blank))
            .transpose()?
            .unwrap_or_default();

        let on_mailet_exception = config
            .on_mailet_exception
            .as_deref()
            .map(|value| MailetPolicy::parse(value).ok_or_else(blank))
            .transpose()?
            .unwrap_or_default();

        Ok(Self::from_boxed(matcher, mailet)
            .on_match_exception(on_match_exception)
            .on_mailet_exception(on_mailet_exception))
    }

    pub fn info(&self) -> StageInfo {
        StageInfo {
            matcher: self.matcher.info(),
            mailet: self.mailet.info(),
            on_match_exception: self.on_match_exception.clone(),
            on_mailet_exception: self.on_mailet_exception.clone(),
        }
    }
}

/// Description of a stage for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub matcher: String,
    pub mailet: String,
    pub on_match_exception: MatchPolicy,
    pub on_mailet_exception: MailetPolicy,
}

/// The injected final stage's mailet.
struct Terminator {
    processor: State,
}

#[async_trait]
impl Mailet for Terminator {
    async fn service(&self, envelope: &mut Envelope) -> Result<(), MailetError> {
        if envelope.state().is_error() {
            return Ok(());
        }

        tracing::warn!(
            processor = %self.processor,
            envelope_id = %envelope.id(),
            "Envelope reached the end of the processor without being handled"
        );
        envelope.set_state(State::GHOST);
        Ok(())
    }

    fn info(&self) -> String {
        "Terminator".to_string()
    }
}

/// A finished envelope released without being spooled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposal {
    pub id: EnvelopeId,
    pub recipients: Vec<MailAddress>,
}

/// A matcher or mailet failure that was routed by policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub envelope: EnvelopeId,
    pub stage: usize,
    pub target: State,
    pub message: String,
}

/// Where everything that came out of a `service` call went.
///
/// The input envelope itself is never written to the spool by the
/// processor: it comes back as [`ServiceReport::original`], in its final
/// state, for the caller to store or remove.
#[derive(Debug)]
pub struct ServiceReport {
    /// The input envelope after processing.
    pub original: Envelope,
    /// Envelopes split off the input and written to the spool.
    pub stored: Vec<Envelope>,
    /// Envelopes split off the input and finished.
    pub disposed: Vec<Disposal>,
    pub failures: Vec<StageFailure>,
}

/// Bookkeeping for one `service` call.
struct Run<'a> {
    processor: &'a State,
    original_id: EnvelopeId,
    original: Option<Envelope>,
    stored: Vec<Envelope>,
    disposed: Vec<Disposal>,
    failures: Vec<StageFailure>,
}

impl Run<'_> {
    /// The envelope is finished with.
    fn dispose(&mut self, envelope: Envelope) {
        pipeline!(processor = %self.processor, envelope_id = %envelope.id(), "Disposing envelope");

        if envelope.id() == self.original_id {
            self.original = Some(envelope);
        } else {
            self.disposed.push(Disposal {
                id: envelope.id(),
                recipients: envelope.recipients().to_vec(),
            });
        }
    }

    /// The envelope leaves this processor in its current state.
    async fn hand_off(
        &mut self,
        envelope: Envelope,
        spool: &dyn SpoolStore,
    ) -> Result<(), ProcessorError> {
        pipeline!(
            processor = %self.processor,
            envelope_id = %envelope.id(),
            state = %envelope.state(),
            "Handing off envelope"
        );

        if envelope.id() == self.original_id {
            self.original = Some(envelope);
        } else {
            if let Err(source) = spool.store(&envelope).await {
                return Err(ProcessorError::Spool {
                    source,
                    settled: self.settled(),
                });
            }
            self.stored.push(envelope);
        }

        Ok(())
    }

    /// Disposes a finished envelope, hands off anything else.
    async fn settle(
        &mut self,
        envelope: Envelope,
        spool: &dyn SpoolStore,
    ) -> Result<(), ProcessorError> {
        if envelope.state().is_ghost() {
            self.dispose(envelope);
            Ok(())
        } else {
            self.hand_off(envelope, spool).await
        }
    }

    /// Recipients that no longer depend on this run: stored, or finished.
    fn settled(&self) -> Vec<MailAddress> {
        let ghosted = self
            .original
            .iter()
            .filter(|original| original.state().is_ghost());

        self.stored
            .iter()
            .chain(ghosted)
            .flat_map(Envelope::recipients)
            .chain(self.disposed.iter().flat_map(|d| d.recipients.iter()))
            .cloned()
            .collect()
    }

    fn redirect(&mut self, envelope: &mut Envelope, stage: usize, target: State, message: String) {
        tracing::error!(
            processor = %self.processor,
            envelope_id = %envelope.id(),
            stage,
            target = %target,
            "{message}"
        );

        envelope.set_error_message(message.clone());
        envelope.set_state(target.clone());

        self.failures.push(StageFailure {
            envelope: envelope.id(),
            stage,
            target,
            message,
        });
    }
}

/// An ordered chain of stages serving envelopes in one state.
pub struct Processor {
    name: State,
    spool: std::sync::Arc<dyn SpoolStore>,
    pending: Mutex<Vec<Stage>>,
    stages: OnceLock<Box<[Stage]>>,
    disposed: AtomicBool,
}

impl Processor {
    /// An open processor with no stages.
    pub fn new(name: State, spool: std::sync::Arc<dyn SpoolStore>) -> Self {
        Self {
            name,
            spool,
            pending: Mutex::new(Vec::new()),
            stages: OnceLock::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Builds and closes a processor from configuration.
    ///
    /// Either every stage loads or no processor is produced.
    ///
    /// # Errors
    ///
    /// The first stage that fails to build.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(processor = %config.name)), timing(precision = "us"))]
    pub fn from_config(config: &ProcessorConfig, loader: &Loader) -> Result<Self, ProcessorError> {
        let processor = Self::new(
            State::new(&config.name),
            std::sync::Arc::clone(loader.context().spool()),
        );

        for (index, stage) in config.stages.iter().enumerate() {
            processor.add(Stage::from_config(&config.name, index, stage, loader)?)?;
        }

        processor.close()?;
        Ok(processor)
    }

    pub const fn name(&self) -> &State {
        &self.name
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// [`ProcessorError::Closed`] once the processor has been closed.
    pub fn add(&self, stage: Stage) -> Result<(), ProcessorError> {
        let mut pending = self.pending.lock();
        if self.stages.get().is_some() {
            return Err(ProcessorError::Closed(self.name.clone()));
        }

        pending.push(stage);
        Ok(())
    }

    /// Seals the stage list, appending the terminal stage.
    ///
    /// # Errors
    ///
    /// [`ProcessorError::Closed`] if already closed.
    pub fn close(&self) -> Result<(), ProcessorError> {
        let mut pending = self.pending.lock();
        if self.stages.get().is_some() {
            return Err(ProcessorError::Closed(self.name.clone()));
        }

        let mut stages = std::mem::take(&mut *pending);
        stages.push(Stage::new(
            All,
            Terminator {
                processor: self.name.clone(),
            },
        ));

        internal!(processor = %self.name, stages = stages.len(), "Closed processor");

        self.stages
            .set(stages.into_boxed_slice())
            .map_err(|_| ProcessorError::Closed(self.name.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.stages.get().is_some()
    }

    /// Matcher and mailet descriptions for every stage, terminator included
    /// once closed.
    pub fn stage_infos(&self) -> Vec<StageInfo> {
        self.stages.get().map_or_else(
            || self.pending.lock().iter().map(Stage::info).collect(),
            |stages| stages.iter().map(Stage::info).collect(),
        )
    }

    /// Every state this processor's exception policies can route to.
    pub fn policy_targets(&self) -> Vec<(usize, State)> {
        self.stage_infos()
            .into_iter()
            .enumerate()
            .flat_map(|(index, info)| {
                [
                    info.on_match_exception.target(),
                    info.on_mailet_exception.target(),
                ]
                .into_iter()
                .flatten()
                .map(move |target| (index, target))
            })
            .collect()
    }

    /// Runs `envelope` through the stage chain.
    ///
    /// Every recipient of the input ends up in exactly one envelope that is
    /// either the returned original, stored to the spool, or disposed.
    ///
    /// # Errors
    ///
    /// Servicing before [`close`](Processor::close) or after
    /// [`dispose`](Processor::dispose), and spool failures while handing off
    /// split envelopes. Matcher and mailet failures are not errors here.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(processor = %self.name, envelope_id = %envelope.id())), timing(precision = "us"))]
    pub async fn service(&self, envelope: Envelope) -> Result<ServiceReport, ProcessorError> {
        let stages = self
            .stages
            .get()
            .ok_or_else(|| ProcessorError::NotClosed(self.name.clone()))?;

        if self.disposed.load(Ordering::Acquire) {
            return Err(ProcessorError::Disposed(self.name.clone()));
        }

        let original_state = envelope.state().clone();
        let mut run = Run {
            processor: &self.name,
            original_id: envelope.id(),
            original: None,
            stored: Vec::new(),
            disposed: Vec::new(),
            failures: Vec::new(),
        };

        // One queue per stage, plus one for envelopes that pass the end.
        let mut queues: Vec<VecDeque<Envelope>> = std::iter::repeat_with(VecDeque::new)
            .take(stages.len() + 1)
            .collect();
        queues[0].push_back(envelope);

        while let Some(index) = queues.iter().position(|queue| !queue.is_empty()) {
            let Some(mut envelope) = queues[index].pop_front() else {
                break;
            };

            let Some(stage) = stages.get(index) else {
                // Only envelopes the terminator leaves alone (those in the
                // error state) get here.
                run.hand_off(envelope, self.spool.as_ref()).await?;
                continue;
            };

            let matched = match stage
                .matcher
                .matches(&envelope)
                .and_then(|result| result.normalise(&envelope))
            {
                Ok(result) => result,
                Err(err) => match &stage.on_match_exception {
                    MatchPolicy::NoMatch => {
                        pipeline!(level = DEBUG, stage = index, error = %err, "Match failure treated as no match");
                        MatchResult::None
                    }
                    MatchPolicy::MatchAll => {
                        pipeline!(level = DEBUG, stage = index, error = %err, "Match failure treated as match all");
                        MatchResult::All
                    }
                    MatchPolicy::Error | MatchPolicy::Processor(_) => {
                        let target = stage.on_match_exception.target().unwrap_or(State::ERROR);
                        let message = describe(&stage.matcher.info(), &err);
                        run.redirect(&mut envelope, index, target, message);
                        run.settle(envelope, self.spool.as_ref()).await?;
                        continue;
                    }
                },
            };

            match matched {
                MatchResult::None => {
                    queues[index + 1].push_back(envelope);
                    continue;
                }
                MatchResult::Some(recipients) => match envelope.split(&recipients) {
                    Ok(Some(unmatched)) => queues[index + 1].push_back(unmatched),
                    Ok(None) => {}
                    Err(err) => {
                        // normalise() already checked the selection, so this
                        // is the matcher contract being broken.
                        let target = stage.on_match_exception.target().unwrap_or(State::ERROR);
                        let message = describe(&stage.matcher.info(), &err);
                        run.redirect(&mut envelope, index, target, message);
                        run.settle(envelope, self.spool.as_ref()).await?;
                        continue;
                    }
                },
                MatchResult::All => {}
            }

            let recipients = envelope.recipients().to_vec();
            let serviced = match stage.mailet.service(&mut envelope).await {
                Ok(()) => Ok(()),
                Err(err) if stage.on_mailet_exception == MailetPolicy::Ignore => {
                    pipeline!(level = DEBUG, stage = index, error = %err, "Ignoring mailet failure");
                    Ok(())
                }
                Err(err) => Err(err),
            }
            .and_then(|()| verify_recipients(&envelope));

            if let Err(err) = serviced {
                // A redirected envelope keeps the recipients it came in with.
                if envelope.recipients().is_empty() {
                    envelope.set_recipients(recipients);
                }
                let target = stage.on_mailet_exception.target().unwrap_or(State::ERROR);
                let message = describe(&stage.mailet.info(), &err);
                run.redirect(&mut envelope, index, target, message);
                run.settle(envelope, self.spool.as_ref()).await?;
                continue;
            }

            if *envelope.state() == original_state {
                queues[index + 1].push_back(envelope);
            } else if envelope.state().is_ghost() {
                run.dispose(envelope);
            } else {
                run.hand_off(envelope, self.spool.as_ref()).await?;
            }
        }

        let original = run
            .original
            .ok_or(ProcessorError::EnvelopeLost(run.original_id))?;

        Ok(ServiceReport {
            original,
            stored: run.stored,
            disposed: run.disposed,
            failures: run.failures,
        })
    }

    /// Destroys every mailet, in stage order. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let destroy = |stage: &Stage| {
            if let Err(err) = stage.mailet.destroy() {
                tracing::error!(
                    processor = %self.name,
                    mailet = %stage.mailet.info(),
                    error = %err,
                    "Failed to destroy mailet"
                );
            }
        };

        match self.stages.get() {
            Some(stages) => stages.iter().for_each(destroy),
            None => self.pending.lock().iter().for_each(destroy),
        }

        internal!(processor = %self.name, "Disposed processor");
    }
}

/// A live envelope must keep at least one recipient.
fn verify_recipients(envelope: &Envelope) -> Result<(), MailetError> {
    if envelope.recipients().is_empty() && !envelope.state().is_ghost() {
        return Err(MailetError::RecipientViolation(envelope.id()));
    }

    Ok(())
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
