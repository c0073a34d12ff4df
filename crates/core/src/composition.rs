//! Composition planning: ffmpeg argument vectors and filter graphs for the
//! per-scene mux, the final join, and mock clip rendering.
//!
//! Everything here is pure; execution lives with the callers.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Frame rate of rendered placeholder clips.
pub const MOCK_CLIP_FPS: u32 = 25;

/// Audio bitrate used for every AAC encode.
pub const AUDIO_BITRATE: &str = "128k";

// ---------------------------------------------------------------------------
// Transitions / timing
// ---------------------------------------------------------------------------

/// Pause inserted after a scene, before the next one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Gap in seconds; frozen last frame plus silence.
    #[serde(default, alias = "audioGap")]
    pub gap_secs: f64,
}

/// How the composed scenes will be joined.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcatPlan {
    /// Direct concat-demuxer join.
    Simple,
    /// Filter-graph join; one gap per scene, last entry always zero.
    WithGaps(Vec<f64>),
}

/// Normalise transitions into one gap per scene.
///
/// Gap `i` sits between position `i` and `i + 1`, so the last scene never
/// carries one. Missing, negative or non-finite gaps count as zero and
/// entries past the last boundary are ignored.
pub fn scene_gaps(transitions: &[Transition], scene_count: usize) -> Vec<f64> {
    (0..scene_count)
        .map(|i| {
            if i + 1 >= scene_count {
                return 0.0;
            }
            transitions
                .get(i)
                .map(|t| t.gap_secs)
                .filter(|g| g.is_finite() && *g > 0.0)
                .unwrap_or(0.0)
        })
        .collect()
}

/// Decide between a plain join and a gap-aware join.
pub fn plan_concat(transitions: &[Transition], scene_count: usize) -> ConcatPlan {
    let gaps = scene_gaps(transitions, scene_count);
    if scene_count >= 2 && gaps.iter().any(|g| *g > 0.0) {
        ConcatPlan::WithGaps(gaps)
    } else {
        ConcatPlan::Simple
    }
}

/// Expected final duration: scenes plus positive gaps.
pub fn final_duration(scene_durations: &[f64], plan: &ConcatPlan) -> f64 {
    let scenes: f64 = scene_durations.iter().sum();
    match plan {
        ConcatPlan::Simple => scenes,
        ConcatPlan::WithGaps(gaps) => scenes + gaps.iter().sum::<f64>(),
    }
}

/// Build the gap-aware `filter_complex` graph.
///
/// Each gapped scene gets its video extended with `tpad` (clone last frame)
/// and its audio padded with `apad`, so every pair lines up before the two
/// `concat` filters join the streams into `[vout]` and `[aout]`.
pub fn gap_filter_graph(gaps: &[f64]) -> String {
    let n = gaps.len();
    let mut parts = Vec::new();
    let mut video = String::new();
    let mut audio = String::new();

    for (i, gap) in gaps.iter().enumerate() {
        if *gap > 0.0 {
            parts.push(format!(
                "[{i}:v]tpad=stop_mode=clone:stop_duration={gap}[v{i}]"
            ));
            parts.push(format!("[{i}:a]apad=pad_dur={gap}[a{i}]"));
            video.push_str(&format!("[v{i}]"));
            audio.push_str(&format!("[a{i}]"));
        } else {
            video.push_str(&format!("[{i}:v]"));
            audio.push_str(&format!("[{i}:a]"));
        }
    }

    parts.push(format!("{video}concat=n={n}:v=1:a=0[vout]"));
    parts.push(format!("{audio}concat=n={n}:v=0:a=1[aout]"));
    parts.join(";")
}

/// Contents of a concat-demuxer list file.
pub fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------

fn args<const N: usize>(items: [&str; N]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}

/// Mux one scene's clip with its narration, optionally burning a caption.
pub fn compose_scene_args(
    video: &Path,
    voice: &Path,
    output: &Path,
    caption_filter: Option<&str>,
) -> Vec<OsString> {
    let mut cmd = args(["-y", "-i"]);
    cmd.push(video.into());
    cmd.push("-i".into());
    cmd.push(voice.into());

    match caption_filter {
        Some(filter) => {
            cmd.push("-filter_complex".into());
            cmd.push(format!("[0:v]{filter}[v]").into());
            cmd.extend(args(["-map", "[v]", "-map", "1:a", "-c:v", "libx264"]));
        }
        None => cmd.extend(args(["-c:v", "copy"])),
    }

    cmd.extend(args(["-c:a", "aac", "-b:a", AUDIO_BITRATE, "-shortest"]));
    cmd.push(output.into());
    cmd
}

/// Plain join through the concat demuxer.
pub fn concat_simple_args(list_file: &Path, output: &Path) -> Vec<OsString> {
    let mut cmd = args(["-y", "-f", "concat", "-safe", "0", "-i"]);
    cmd.push(list_file.into());
    cmd.extend(args([
        "-c:v",
        "libx264",
        "-c:a",
        "aac",
        "-b:a",
        AUDIO_BITRATE,
        "-movflags",
        "+faststart",
    ]));
    cmd.push(output.into());
    cmd
}

/// Gap-aware join through `filter_complex`.
pub fn concat_gap_args(inputs: &[PathBuf], gaps: &[f64], output: &Path) -> Vec<OsString> {
    let mut cmd = args(["-y"]);
    for input in inputs {
        cmd.push("-i".into());
        cmd.push(input.into());
    }
    cmd.push("-filter_complex".into());
    cmd.push(gap_filter_graph(gaps).into());
    cmd.extend(args([
        "-map",
        "[vout]",
        "-map",
        "[aout]",
        "-c:v",
        "libx264",
        "-c:a",
        "aac",
        "-b:a",
        AUDIO_BITRATE,
        "-movflags",
        "+faststart",
    ]));
    cmd.push(output.into());
    cmd
}

/// Render a still image into a slowly zooming clip without audio.
pub fn frozen_clip_args(
    image: &Path,
    duration_secs: f64,
    width: u32,
    height: u32,
    output: &Path,
) -> Vec<OsString> {
    let frames = (duration_secs * MOCK_CLIP_FPS as f64).round().max(1.0) as u64;
    let filter = format!(
        "scale={width}:{height},zoompan=z='min(zoom+0.001,1.05)':d={frames}:s={width}x{height}"
    );

    let mut cmd = args(["-y", "-loop", "1", "-i"]);
    cmd.push(image.into());
    cmd.push("-t".into());
    cmd.push(format!("{duration_secs}").into());
    cmd.push("-vf".into());
    cmd.push(filter.into());
    cmd.extend(args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-r"]));
    cmd.push(MOCK_CLIP_FPS.to_string().into());
    cmd.push("-an".into());
    cmd.push(output.into());
    cmd
}

/// Apply an `atempo` chain to a recording.
pub fn tempo_args(input: &Path, filter: &str, output: &Path) -> Vec<OsString> {
    let mut cmd = args(["-y", "-i"]);
    cmd.push(input.into());
    cmd.push("-af".into());
    cmd.push(filter.into());
    cmd.push(output.into());
    cmd
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gap(secs: f64) -> Transition {
        Transition { gap_secs: secs }
    }

    fn lossy(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn gaps_ignore_last_scene_and_invalid_values() {
        let transitions = [gap(1.0), gap(-2.0), gap(f64::NAN), gap(3.0)];
        assert_eq!(scene_gaps(&transitions, 4), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_transitions_mean_no_gap() {
        assert_eq!(scene_gaps(&[gap(0.5)], 3), vec![0.5, 0.0, 0.0]);
        assert_eq!(plan_concat(&[], 3), ConcatPlan::Simple);
    }

    #[test]
    fn single_scene_always_uses_simple_join() {
        assert_eq!(plan_concat(&[gap(2.0)], 1), ConcatPlan::Simple);
    }

    #[test]
    fn final_duration_adds_positive_gaps() {
        let durations = [5.0, 4.0, 6.0];
        let plan = plan_concat(&[gap(1.5), gap(0.5)], 3);
        assert!((final_duration(&durations, &plan) - 17.0).abs() < 1e-9);
    }

    #[test]
    fn final_duration_without_gaps_is_exact_sum() {
        let durations = [5.0, 4.0, 6.0];
        let plan = plan_concat(&[gap(0.0), gap(0.0)], 3);
        assert_eq!(plan, ConcatPlan::Simple);
        assert_eq!(final_duration(&durations, &plan), 15.0);
    }

    #[test]
    fn gap_filter_graph_pads_only_gapped_scenes() {
        let graph = gap_filter_graph(&[1.5, 0.0, 0.0]);
        assert_eq!(
            graph,
            "[0:v]tpad=stop_mode=clone:stop_duration=1.5[v0];\
             [0:a]apad=pad_dur=1.5[a0];\
             [v0][1:v][2:v]concat=n=3:v=1:a=0[vout];\
             [a0][1:a][2:a]concat=n=3:v=0:a=1[aout]"
        );
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/out/a.mp4"), PathBuf::from("/out/it's.mp4")]);
        assert_eq!(list, "file '/out/a.mp4'\nfile '/out/it'\\''s.mp4'\n");
    }

    #[test]
    fn compose_without_caption_copies_video() {
        let cmd = lossy(&compose_scene_args(
            Path::new("v.mp4"),
            Path::new("a.wav"),
            Path::new("o.mp4"),
            None,
        ));
        assert_eq!(
            cmd,
            vec![
                "-y", "-i", "v.mp4", "-i", "a.wav", "-c:v", "copy", "-c:a", "aac", "-b:a", "128k",
                "-shortest", "o.mp4"
            ]
        );
    }

    #[test]
    fn compose_with_caption_reencodes_through_filter() {
        let cmd = lossy(&compose_scene_args(
            Path::new("v.mp4"),
            Path::new("a.wav"),
            Path::new("o.mp4"),
            Some("drawtext=text='x'"),
        ));
        assert!(cmd.contains(&"[0:v]drawtext=text='x'[v]".to_string()));
        assert!(cmd.contains(&"libx264".to_string()));
        assert!(!cmd.contains(&"copy".to_string()));
    }

    #[test]
    fn gap_args_list_every_input() {
        let inputs = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];
        let cmd = lossy(&concat_gap_args(&inputs, &[1.0, 0.0], Path::new("f.mp4")));
        assert_eq!(&cmd[..5], &["-y", "-i", "a.mp4", "-i", "b.mp4"]);
        assert_eq!(cmd.last().map(String::as_str), Some("f.mp4"));
    }

    #[test]
    fn frozen_clip_frame_count_matches_duration() {
        let cmd = lossy(&frozen_clip_args(
            Path::new("s.png"),
            5.0,
            1080,
            1920,
            Path::new("s.mp4"),
        ));
        assert!(cmd
            .iter()
            .any(|a| a.contains("d=125:s=1080x1920") && a.starts_with("scale=1080:1920")));
        assert!(cmd.contains(&"-an".to_string()));
    }

    #[test]
    fn transition_accepts_legacy_field_name() {
        let t: Transition = serde_json::from_str(r#"{"audioGap": 0.8}"#).unwrap();
        assert_eq!(t.gap_secs, 0.8);
    }
}
