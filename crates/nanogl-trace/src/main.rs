//! Replays a sample scene against a recording context and prints what the
//! object model sent to the native layer.
//!
//! ```text
//! nanogl-trace [--frames N] [--size WxH] [--dump] [--verbose]
//! ```

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use nanogl::context::GlCall;
use nanogl::logging::{init_logging, LoggingConfig};

mod scene;

#[derive(Debug, Clone, PartialEq)]
struct Args {
    frames: usize,
    width: u32,
    height: u32,
    /// Print every call of the last frame.
    dump: bool,
    verbose: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self { frames: 3, width: 640, height: 480, dump: false, verbose: false }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let n = args.next().context("--frames needs a value")?;
                parsed.frames = n.parse().with_context(|| format!("invalid frame count `{n}`"))?;
            }
            "--size" => {
                let size = args.next().context("--size needs a value")?;
                let (w, h) = size.split_once('x').with_context(|| format!("expected WxH, got `{size}`"))?;
                parsed.width = w.parse().with_context(|| format!("invalid width `{w}`"))?;
                parsed.height = h.parse().with_context(|| format!("invalid height `{h}`"))?;
            }
            "--dump" => parsed.dump = true,
            "--verbose" | "-v" => parsed.verbose = true,
            other => bail!("unknown argument `{other}`"),
        }
    }
    Ok(parsed)
}

/// Short label grouping related calls in the summary.
fn category(call: &GlCall) -> &'static str {
    match call {
        GlCall::UseProgram(_) => "program bind",
        GlCall::BindVertexArray(_) => "vertex array bind",
        GlCall::BindFramebuffer(_) => "framebuffer bind",
        GlCall::BindTexture(..) | GlCall::ActiveTexture(_) => "texture bind",
        GlCall::BindBuffer(..)
        | GlCall::VertexAttribPointer { .. }
        | GlCall::VertexAttribIPointer { .. }
        | GlCall::EnableVertexAttribArray(_) => "attribute setup",
        GlCall::Clear(_) => "clear",
        c if c.is_uniform_upload() => "uniform upload",
        c if c.is_draw() => "draw",
        _ => "other",
    }
}

fn summarize(calls: &[GlCall]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for call in calls {
        *counts.entry(category(call)).or_insert(0) += 1;
    }
    counts
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    init_logging(LoggingConfig {
        env_filter: args.verbose.then(|| "debug".to_string()),
        ..LoggingConfig::default()
    });

    let mut scene = scene::Scene::build(scene::context(args.width, args.height))?;
    let setup = scene.app.gl_mut().take_calls();
    println!("setup: {} calls", setup.len());

    for frame in 0..args.frames {
        scene.frame(frame as f32 / 60.0);
        let calls = scene.app.gl_mut().take_calls();

        println!("frame {frame}: {} calls", calls.len());
        for (label, n) in summarize(&calls) {
            println!("  {label:<18} {n}");
        }

        if args.dump && frame + 1 == args.frames {
            for call in &calls {
                println!("    {call:?}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    // ── arguments ─────────────────────────────────────────────────────────

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn parses_frames_and_size() {
        let parsed = args(&["--frames", "10", "--size", "800x600", "--dump"]).unwrap();
        assert_eq!(parsed.frames, 10);
        assert_eq!((parsed.width, parsed.height), (800, 600));
        assert!(parsed.dump);
        assert!(!parsed.verbose);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(args(&["--frames"]).is_err());
        assert!(args(&["--frames", "many"]).is_err());
        assert!(args(&["--size", "800"]).is_err());
        assert!(args(&["--fast"]).is_err());
    }

    // ── summary ───────────────────────────────────────────────────────────

    #[test]
    fn summary_groups_calls() {
        let calls = [
            GlCall::UseProgram(None),
            GlCall::Clear(0),
            GlCall::DrawArrays { mode: 4, first: 0, count: 3 },
            GlCall::DrawArrays { mode: 4, first: 3, count: 3 },
            GlCall::Enable(0),
        ];
        let summary = summarize(&calls);
        assert_eq!(summary.get("draw"), Some(&2));
        assert_eq!(summary.get("program bind"), Some(&1));
        assert_eq!(summary.get("other"), Some(&1));
        assert_eq!(summary.get("uniform upload"), None);
    }
}
