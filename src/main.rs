use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::info;

use reel_runtime::app::{parse_click, print_final_state, TextCanvas};
use reel_runtime::{KeyCode, LuaActionExecutor, MouseButton, Scene};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let xml = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read scene {}", options.path))?;
    let mut scene = Scene::from_xml(&xml).context("failed to parse scene")?;
    if let Some(version) = options.script_version {
        scene.config.version = version;
    }
    if let Some(fps) = options.fps {
        scene.config.frame_rate = fps;
    }
    if let Some(seed) = options.seed {
        scene.config.seed = seed;
    }

    println!(
        "Loaded scene with {} nodes ({} fonts), version {} at {} fps",
        count_nodes(&scene.root),
        scene.fonts.len(),
        scene.config.version,
        scene.config.frame_rate
    );

    let frame_time = scene.config.frame_time();
    let mut stage = scene.build_stage(Box::new(LuaActionExecutor::new()))?;
    for frame in 0..options.frames {
        stage.advance(frame_time);
        if frame == 0 {
            for input in &options.inputs {
                match input {
                    ScriptedInput::Click(point) => {
                        info!("click at {point}");
                        let mask = MouseButton::LEFT.mask();
                        stage.notify_mouse_moved(point.x, point.y);
                        stage.notify_mouse_clicked(true, mask);
                        stage.notify_mouse_clicked(false, mask);
                    }
                    ScriptedInput::Key(key) => {
                        info!("key {key:?}");
                        stage.notify_key_pressed(*key);
                        stage.notify_key_released(*key);
                    }
                }
            }
        }
    }
    println!("Ran {} frame(s)", options.frames);

    let output = stage.vm().take_trace_output();
    if !output.is_empty() {
        println!("Trace output:");
        for line in output {
            println!("  {line}");
        }
    }

    print_final_state(&stage);
    if !options.summary_only {
        let mut canvas = TextCanvas::new();
        stage.display(&mut canvas);
        println!("Display list:");
        for line in canvas.lines() {
            println!("{line}");
        }
    }
    Ok(())
}

fn count_nodes(node: &reel_runtime::Node) -> usize {
    1 + node
        .children()
        .iter()
        .map(count_nodes)
        .sum::<usize>()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScriptedInput {
    Click(Vec2),
    Key(KeyCode),
}

#[derive(Debug)]
struct CliOptions {
    path: String,
    frames: u32,
    fps: Option<f32>,
    script_version: Option<u8>,
    seed: Option<u64>,
    inputs: Vec<ScriptedInput>,
    summary_only: bool,
}

const USAGE: &str = "Usage: reel-runtime <scene.xml> [--frames N] [--fps N] \
[--script-version N] [--seed N] [--click X,Y] [--key NAME] [--summary-only]";

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let Some(path) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            path,
            frames: 1,
            fps: None,
            script_version: None,
            seed: None,
            inputs: Vec::new(),
            summary_only: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--frames" => options.frames = parse_flag(&arg, args.next())?,
                "--fps" => options.fps = Some(parse_flag(&arg, args.next())?),
                "--script-version" => options.script_version = Some(parse_flag(&arg, args.next())?),
                "--seed" => options.seed = Some(parse_flag(&arg, args.next())?),
                "--click" => {
                    let value = args.next().ok_or_else(|| anyhow!("--click needs X,Y"))?;
                    options.inputs.push(ScriptedInput::Click(parse_click(&value)?));
                }
                "--key" => {
                    let value = args.next().ok_or_else(|| anyhow!("--key needs a key name"))?;
                    let key = KeyCode::from_name(&value)
                        .ok_or_else(|| anyhow!("unknown key name: {value}"))?;
                    options.inputs.push(ScriptedInput::Key(key));
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }
        Ok(options)
    }
}

fn parse_flag<T>(flag: &str, value: Option<String>) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = value.ok_or_else(|| anyhow!("{flag} needs a value"))?;
    value
        .parse()
        .map_err(|err| anyhow!("invalid value `{value}` for {flag}: {err}"))
}
