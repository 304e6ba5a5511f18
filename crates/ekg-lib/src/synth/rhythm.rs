//! Beat timing: sinus rhythm with HRV, AV conduction and ectopy.

use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::metrics::hrv::{hrv_time_segments, HrvSummary};
use crate::signal::RRSeries;
use crate::synth::ectopy::EctopyState;
use crate::synth::params::{AgeProfile, Conduction, EctopyConfig, EctopyKind, HrvParams, Pathology};
use crate::synth::random::{SeededRng, Stream};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatFlags {
    pub has_p_wave: bool,
    pub has_qrs: bool,
    pub is_pac: bool,
    pub is_pvc: bool,
    pub is_escape: bool,
}

/// One scheduled event. Times are onsets in seconds from record start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub p_time: Option<f64>,
    pub qrs_time: Option<f64>,
    pub flags: BeatFlags,
    /// Time since the previous QRS onset.
    pub rr_prev: Option<f64>,
    pub pr_interval: Option<f64>,
}

impl BeatEvent {
    /// Earliest onset of the event.
    pub fn time(&self) -> f64 {
        self.p_time.or(self.qrs_time).unwrap_or(0.0)
    }

    pub fn is_ectopic(&self) -> bool {
        self.flags.is_pac || self.flags.is_pvc
    }
}

/// Time-ordered beat list for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatSchedule {
    pub beats: Vec<BeatEvent>,
    pub duration_s: f64,
}

impl BeatSchedule {
    pub fn qrs_times(&self) -> Vec<f64> {
        self.beats.iter().filter_map(|b| b.qrs_time).collect()
    }

    pub fn p_times(&self) -> Vec<f64> {
        self.beats.iter().filter_map(|b| b.p_time).collect()
    }

    pub fn rr_intervals(&self) -> Vec<f64> {
        self.qrs_times().windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn mean_rr(&self) -> Option<f64> {
        RRSeries {
            rr: self.rr_intervals(),
        }
        .mean()
    }

    /// Mean PR over conducted beats that carry a P wave.
    pub fn mean_pr(&self) -> Option<f64> {
        let prs: Vec<f64> = self.beats.iter().filter_map(|b| b.pr_interval).collect();
        if prs.is_empty() {
            None
        } else {
            Some(prs.iter().sum::<f64>() / prs.len() as f64)
        }
    }

    /// Runs of consecutive normal-to-normal intervals. An ectopic beat ends
    /// the current run; the intervals into and out of it are dropped.
    pub fn nn_segments(&self) -> Vec<RRSeries> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        let mut prev: Option<&BeatEvent> = None;
        for beat in self.beats.iter().filter(|b| b.flags.has_qrs) {
            if let Some(p) = prev {
                if !p.is_ectopic() && !beat.is_ectopic() {
                    if let (Some(a), Some(b)) = (p.qrs_time, beat.qrs_time) {
                        current.push(b - a);
                    }
                } else if !current.is_empty() {
                    segments.push(RRSeries {
                        rr: std::mem::take(&mut current),
                    });
                }
            }
            prev = Some(beat);
        }
        if !current.is_empty() {
            segments.push(RRSeries { rr: current });
        }
        segments
    }

    pub fn hrv_summary(&self) -> HrvSummary {
        hrv_time_segments(&self.nn_segments()).into()
    }
}

/// Sinus-node RR generator: baseline RR plus RSA/LF/VLF sinusoids and jitter.
#[derive(Debug, Clone)]
pub struct RrModulator {
    rr0: f64,
    hrv: HrvParams,
    phases: [f64; 3],
    rng: SeededRng,
}

impl RrModulator {
    pub fn new(rr0: f64, hrv: HrvParams, mut rng: SeededRng) -> Self {
        let phases = [
            rng.range(0.0, 2.0 * PI),
            rng.range(0.0, 2.0 * PI),
            rng.range(0.0, 2.0 * PI),
        ];
        Self {
            rr0,
            hrv,
            phases,
            rng,
        }
    }

    pub fn baseline(&self) -> f64 {
        self.rr0
    }

    /// RR interval starting at time `t`.
    pub fn next_rr(&mut self, t: f64) -> f64 {
        let h = &self.hrv;
        let rr = self.rr0
            + h.rsa_amp_s * (2.0 * PI * h.rsa_hz * t + self.phases[0]).sin()
            + h.lf_amp_s * (2.0 * PI * h.lf_hz * t + self.phases[1]).sin()
            + h.vlf_amp_s * (2.0 * PI * h.vlf_hz * t + self.phases[2]).sin()
            + h.jitter_s * self.rng.normal();
        rr.clamp(0.6 * self.rr0, 1.6 * self.rr0)
    }

    fn uniform(&mut self) -> f64 {
        self.rng.uniform()
    }
}

/// Build the beat schedule for one record.
///
/// `ectopy` overrides the diagnosis' own ectopy setting when given.
pub fn generate_schedule(
    profile: &AgeProfile,
    pathology: &Pathology,
    duration_s: f64,
    seed: u32,
    ectopy: Option<EctopyConfig>,
) -> BeatSchedule {
    let rr0 = pathology.rr_s(profile);
    let mut sinus = RrModulator::new(
        rr0,
        pathology.hrv(profile),
        SeededRng::for_stage(seed, Stream::Rhythm),
    );
    let ectopy = ectopy.unwrap_or(pathology.ectopy);

    let beats = match pathology.conduction {
        Conduction::Normal | Conduction::HiddenP => {
            let show_p = pathology.conduction == Conduction::Normal;
            sinus_with_ectopy(&mut sinus, pathology.pr_s, show_p, duration_s, seed, ectopy)
        }
        Conduction::Wenckebach { .. } | Conduction::MobitzII { .. } => {
            if ectopy.kind != EctopyKind::None {
                debug!("ectopy is ignored under second-degree AV block");
            }
            partial_block(&mut sinus, pathology, duration_s)
        }
        Conduction::Complete { escape_bpm } => {
            dissociated(&mut sinus, escape_bpm, duration_s, seed)
        }
    };

    let schedule = BeatSchedule { beats, duration_s };
    debug!(
        "scheduled {} events ({} QRS) over {duration_s} s, baseline RR {rr0:.3} s",
        schedule.beats.len(),
        schedule.qrs_times().len()
    );
    schedule
}

/// First QRS onset: early enough that any record lasting one RR holds a beat.
fn first_onset(sinus: &mut RrModulator, pr: f64) -> f64 {
    let rr0 = sinus.baseline();
    pr + 0.15_f64.min(0.3 * rr0) + 0.2 * rr0 * sinus.uniform()
}

fn sinus_with_ectopy(
    sinus: &mut RrModulator,
    pr: f64,
    show_p: bool,
    duration_s: f64,
    seed: u32,
    ectopy: EctopyConfig,
) -> Vec<BeatEvent> {
    let lead_in = if show_p { pr } else { 0.0 };
    let mut state = EctopyState::new(ectopy, seed);
    let mut beats = Vec::new();
    let mut prev: Option<f64> = None;
    let mut forced: Option<f64> = None;
    let mut index = 0;

    loop {
        let (scheduled, rr) = match prev {
            None => (first_onset(sinus, lead_in), sinus.baseline()),
            Some(p) => {
                let rr = sinus.next_rr(p);
                (forced.take().unwrap_or(p + rr), rr)
            }
        };

        match (prev, state.step(index)) {
            (Some(p), Some(kind)) => {
                let coupling = state.coupling_interval(rr);
                let t = p + coupling;
                if t >= duration_s {
                    break;
                }
                let is_pvc = kind == EctopyKind::Pvc;
                beats.push(BeatEvent {
                    p_time: (!is_pvc && show_p).then_some(t - pr),
                    qrs_time: Some(t),
                    flags: BeatFlags {
                        has_p_wave: !is_pvc && show_p,
                        has_qrs: true,
                        is_pac: !is_pvc,
                        is_pvc,
                        is_escape: false,
                    },
                    rr_prev: Some(coupling),
                    pr_interval: (!is_pvc && show_p).then_some(pr),
                });
                if is_pvc {
                    // The sinus node is not reset: the next beat lands two cycles on.
                    forced = Some(p + 2.0 * rr);
                }
                prev = Some(t);
            }
            _ => {
                if scheduled >= duration_s {
                    break;
                }
                beats.push(BeatEvent {
                    p_time: show_p.then_some(scheduled - pr),
                    qrs_time: Some(scheduled),
                    flags: BeatFlags {
                        has_p_wave: show_p,
                        has_qrs: true,
                        ..BeatFlags::default()
                    },
                    rr_prev: prev.map(|p| scheduled - p),
                    pr_interval: show_p.then_some(pr),
                });
                prev = Some(scheduled);
            }
        }
        index += 1;
    }
    beats
}

/// PR for the `k`-th P wave under second-degree block; `None` when blocked.
fn conducted_pr(conduction: Conduction, base_pr: f64, k: usize) -> Option<f64> {
    match conduction {
        Conduction::Wenckebach {
            conducted,
            increment_s,
        } => {
            let j = k % (conducted + 1);
            (j < conducted).then(|| base_pr + increment_s * (1.0 - 0.55_f64.powi(j as i32)))
        }
        Conduction::MobitzII { ratio } => (k % ratio.max(2) != ratio.max(2) - 1).then_some(base_pr),
        _ => Some(base_pr),
    }
}

fn partial_block(sinus: &mut RrModulator, pathology: &Pathology, duration_s: f64) -> Vec<BeatEvent> {
    let mut beats = Vec::new();
    let mut p_time = first_onset(sinus, pathology.pr_s) - pathology.pr_s;
    let mut last_qrs: Option<f64> = None;
    let mut k = 0;
    while p_time < duration_s {
        match conducted_pr(pathology.conduction, pathology.pr_s, k) {
            // A conducted P whose QRS falls past the end is not a blocked beat.
            Some(pr) if p_time + pr >= duration_s => break,
            Some(pr) => {
                let qrs = p_time + pr;
                beats.push(BeatEvent {
                    p_time: Some(p_time),
                    qrs_time: Some(qrs),
                    flags: BeatFlags {
                        has_p_wave: true,
                        has_qrs: true,
                        ..BeatFlags::default()
                    },
                    rr_prev: last_qrs.map(|q| qrs - q),
                    pr_interval: Some(pr),
                });
                last_qrs = Some(qrs);
            }
            None => beats.push(p_only(p_time)),
        }
        p_time += sinus.next_rr(p_time);
        k += 1;
    }
    beats
}

fn p_only(p_time: f64) -> BeatEvent {
    BeatEvent {
        p_time: Some(p_time),
        qrs_time: None,
        flags: BeatFlags {
            has_p_wave: true,
            ..BeatFlags::default()
        },
        rr_prev: None,
        pr_interval: None,
    }
}

/// Third-degree block: sinus P train and a slower escape focus with its own
/// phase, merged in time order.
fn dissociated(
    sinus: &mut RrModulator,
    escape_bpm: f64,
    duration_s: f64,
    seed: u32,
) -> Vec<BeatEvent> {
    let mut beats = Vec::new();
    let mut p_time = 0.05 + sinus.uniform() * sinus.baseline();
    while p_time < duration_s {
        beats.push(p_only(p_time));
        p_time += sinus.next_rr(p_time);
    }

    let mut escape = SeededRng::for_stage(seed, Stream::Escape);
    let escape_rr = 60.0 / escape_bpm;
    let mut qrs = 0.15 + escape.uniform() * 0.5 * escape_rr;
    let mut last: Option<f64> = None;
    while qrs < duration_s {
        beats.push(BeatEvent {
            p_time: None,
            qrs_time: Some(qrs),
            flags: BeatFlags {
                has_qrs: true,
                is_escape: true,
                ..BeatFlags::default()
            },
            rr_prev: last.map(|l| qrs - l),
            pr_interval: None,
        });
        last = Some(qrs);
        qrs += escape_rr * (1.0 + 0.01 * escape.normal());
    }

    beats.sort_by(|a, b| a.time().total_cmp(&b.time()));
    beats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::params::{AgeGroup, Diagnosis};

    fn schedule(age: f64, dx: Diagnosis, duration: f64, seed: u32) -> BeatSchedule {
        let profile = AgeProfile::for_age(age);
        let pathology = dx.pathology(&profile);
        generate_schedule(&profile, &pathology, duration, seed, None)
    }

    #[test]
    fn schedule_is_deterministic() {
        let a = schedule(30.0, Diagnosis::Pvcs, 20.0, 9);
        let b = schedule(30.0, Diagnosis::Pvcs, 20.0, 9);
        assert_eq!(a, b);
        let c = schedule(30.0, Diagnosis::Pvcs, 20.0, 10);
        assert_ne!(a, c);
    }

    #[test]
    fn qrs_times_increase_and_stay_inside_record() {
        for dx in Diagnosis::ALL {
            let s = schedule(8.0, dx, 10.0, 3);
            let q = s.qrs_times();
            assert!(!q.is_empty(), "{dx}: no beats");
            for pair in q.windows(2) {
                assert!(pair[1] > pair[0], "{dx}: QRS times not increasing");
            }
            assert!(q.iter().all(|&t| t >= 0.0 && t < 10.0));
            assert!(s.p_times().iter().all(|&t| t >= 0.0));
        }
    }

    #[test]
    fn one_rr_of_recording_holds_a_beat() {
        for age in [0.05, 3.0, 30.0, 80.0] {
            for dx in [
                Diagnosis::NormalSinus,
                Diagnosis::SinusTachycardia,
                Diagnosis::SinusBradycardia,
                Diagnosis::FirstDegreeAvb,
                Diagnosis::SvtNarrow,
            ] {
                let profile = AgeProfile::for_age(age);
                let pathology = dx.pathology(&profile);
                let rr = pathology.rr_s(&profile);
                for seed in 0..20 {
                    let s = generate_schedule(&profile, &pathology, rr, seed, None);
                    assert!(!s.qrs_times().is_empty(), "age {age} {dx} seed {seed}");
                }
            }
        }
    }

    #[test]
    fn sdnn_decreases_with_age_group() {
        let ages = [0.05, 8.0, 35.0, 75.0];
        let sdnn: Vec<f64> = ages
            .iter()
            .map(|&age| schedule(age, Diagnosis::NormalSinus, 60.0, 11).hrv_summary().sdnn_ms)
            .collect();
        assert_eq!(AgeGroup::for_age(ages[0]), AgeGroup::Neonate);
        for pair in sdnn.windows(2) {
            assert!(pair[0] > pair[1], "SDNN not decreasing: {sdnn:?}");
        }
    }

    #[test]
    fn pvc_is_followed_by_full_compensatory_pause() {
        let s = schedule(30.0, Diagnosis::Pvcs, 120.0, 4);
        let qrs: Vec<&BeatEvent> = s.beats.iter().filter(|b| b.flags.has_qrs).collect();
        let mut checked = 0;
        for w in qrs.windows(3) {
            if w[1].flags.is_pvc && !w[0].is_ectopic() && !w[2].is_ectopic() {
                let around = w[2].qrs_time.unwrap() - w[0].qrs_time.unwrap();
                let coupling = w[1].rr_prev.unwrap();
                assert!(w[1].p_time.is_none());
                assert!(coupling < around / 2.0);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn ectopic_beats_break_nn_segments() {
        let s = schedule(30.0, Diagnosis::Pacs, 60.0, 2);
        let ectopics = s.beats.iter().filter(|b| b.is_ectopic()).count();
        assert!(ectopics > 0);
        let nn: usize = s.nn_segments().iter().map(|seg| seg.rr.len()).sum();
        assert!(nn < s.rr_intervals().len());
        assert!(s.nn_segments().len() > 1);
    }

    #[test]
    fn wenckebach_pr_lengthens_until_a_p_is_blocked() {
        let s = schedule(30.0, Diagnosis::Wenckebach, 20.0, 1);
        let blocked = s.beats.iter().filter(|b| b.qrs_time.is_none()).count();
        assert!(blocked >= 2);
        let mut run: Vec<f64> = Vec::new();
        for beat in &s.beats {
            match beat.pr_interval {
                Some(pr) => {
                    if let Some(&last) = run.last() {
                        assert!(pr > last);
                    }
                    run.push(pr);
                }
                None => run.clear(),
            }
        }
    }

    #[test]
    fn mobitz_ii_blocks_every_third_p_at_fixed_pr() {
        let s = schedule(30.0, Diagnosis::MobitzII, 20.0, 1);
        let prs: Vec<f64> = s.beats.iter().filter_map(|b| b.pr_interval).collect();
        assert!(prs.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-12));
        for (k, beat) in s.beats.iter().enumerate() {
            if k % 3 == 2 {
                assert!(beat.qrs_time.is_none(), "P {k} was conducted");
            }
        }
    }

    #[test]
    fn only_the_conduction_pattern_blocks_p_waves() {
        for dx in [Diagnosis::Wenckebach, Diagnosis::MobitzII] {
            let profile = AgeProfile::for_age(30.0);
            let pathology = dx.pathology(&profile);
            for seed in 0..30 {
                for duration in [6.3, 7.7, 10.0] {
                    let s = generate_schedule(&profile, &pathology, duration, seed, None);
                    for (k, beat) in s.beats.iter().enumerate() {
                        let blocked = conducted_pr(pathology.conduction, pathology.pr_s, k).is_none();
                        assert_eq!(
                            beat.qrs_time.is_none(),
                            blocked,
                            "{dx} seed {seed} duration {duration}: P {k}"
                        );
                    }
                    let mean_pr = s.mean_pr().unwrap();
                    assert!(mean_pr >= pathology.pr_s - 1e-12, "{dx}: mean PR {mean_pr}");
                }
            }
        }
    }

    #[test]
    fn complete_block_dissociates_atria_and_ventricles() {
        let s = schedule(30.0, Diagnosis::CompleteAvb, 20.0, 7);
        let p = s.p_times();
        let q = s.qrs_times();
        assert!(s.beats.iter().all(|b| b.p_time.is_none() || b.qrs_time.is_none()));
        assert!(q.len() < p.len());
        let since_p: Vec<f64> = q
            .iter()
            .filter_map(|&t| p.iter().rev().find(|&&pt| pt < t).map(|pt| t - pt))
            .collect();
        let min = since_p.iter().copied().fold(f64::INFINITY, f64::min);
        let max = since_p.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(max - min > 0.1, "QRS-to-P spread {:.3} s", max - min);
        assert!(s.beats.iter().filter(|b| b.flags.has_qrs).all(|b| b.flags.is_escape));
    }

    #[test]
    fn svt_has_no_p_waves_and_little_variability() {
        let s = schedule(30.0, Diagnosis::SvtNarrow, 30.0, 5);
        assert!(s.p_times().is_empty());
        let normal = schedule(30.0, Diagnosis::NormalSinus, 30.0, 5);
        assert!(s.hrv_summary().sdnn_ms < normal.hrv_summary().sdnn_ms);
        assert!(s.mean_rr().unwrap() < 0.34);
    }
}
