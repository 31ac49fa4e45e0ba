use abc_codec::export::{AbcExporter, ExportPart, ExportTrack, SongMetadata, parts_from_sequence};
use abc_codec::{
    AbcFile, AbcInfo, ExportParams, Instrument, KeySignature, ParseParams, QuantizedTimingInfo,
    SequenceData, TimeSignature, Timeline,
};
use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

#[cfg(feature = "midi")]
use abc_codec::midi;

#[derive(Debug, PartialEq)]
enum FileFormat {
    Midi,
    Abc,
}

fn detect_file_format(file_path: &str) -> Result<FileFormat> {
    let path = Path::new(file_path);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| anyhow!("File has no extension: {}", file_path))?;

    match extension.to_lowercase().as_str() {
        "mid" | "midi" | "smf" => Ok(FileFormat::Midi),
        "abc" | "txt" => Ok(FileFormat::Abc),
        _ => Err(anyhow!("Unsupported file extension: .{}", extension)),
    }
}

/// Parses `PART=INSTRUMENT`, e.g. `2=theorbo`.
fn parse_instrument_override(s: &str) -> Result<(u32, Instrument)> {
    let (part, name) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected PART=INSTRUMENT, got \"{}\"", s))?;
    let part = part
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid part number \"{}\"", part))?;
    Ok((part, name.parse()?))
}

fn command() -> Command {
    Command::new("abc-codec")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Converts between LOTRO ABC song files and MIDI")
        .arg(
            Arg::new("input")
                .help("Input file (.abc or .mid)")
                .required(true)
                .value_name("INPUT_FILE")
                .index(1),
        )
        .arg(
            Arg::new("output")
                .help("Output file (.abc or .mid)")
                .required(true)
                .value_name("OUTPUT_FILE")
                .index(2),
        )
        .arg(
            Arg::new("verbose")
                .help("Enable verbose output")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .help("Reject notes and chords the game won't play")
                .long("strict")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mono")
                .help("Don't pan parts across the stereo field")
                .long("mono")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-native")
                .help("Render plain General MIDI voices instead of the game's")
                .long("no-native")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed")
                .help("Seed for cowbell pitches")
                .long("seed")
                .value_name("N")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("tempo-factor")
                .help("Multiply every exported tempo (e.g. 0.5, 1.25)")
                .long("tempo-factor")
                .value_name("FACTOR")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("triplets")
                .help("Quantize on a grid fine enough for triplets")
                .long("triplets")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-silence")
                .help("Drop silent bars before the first note")
                .long("skip-silence")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("meter")
                .help("Meter of the exported song (e.g. 3/4)")
                .long("meter")
                .value_name("N/D")
                .value_parser(|s: &str| s.parse::<TimeSignature>().map_err(|e| e.to_string())),
        )
        .arg(
            Arg::new("key")
                .help("Key of the exported song (e.g. \"A min\")")
                .long("key")
                .value_name("KEY")
                .value_parser(|s: &str| s.parse::<KeySignature>().map_err(|e| e.to_string())),
        )
        .arg(
            Arg::new("instrument")
                .help("Instrument for a part, by part number (e.g. 2=theorbo)")
                .long("instrument")
                .value_name("PART=NAME")
                .action(clap::ArgAction::Append)
                .value_parser(|s: &str| parse_instrument_override(s).map_err(|e| e.to_string())),
        )
}

fn parse_params(matches: &ArgMatches, overrides: &HashMap<u32, Instrument>) -> ParseParams {
    let mut params = match matches.get_one::<u64>("seed") {
        Some(seed) => ParseParams::with_seed(*seed),
        None => ParseParams::new(),
    };
    params.strict_validation = matches.get_flag("strict");
    params.stereo_pan = !matches.get_flag("mono");
    params.use_native_instruments = !matches.get_flag("no-native");
    params.instrument_overrides = overrides.clone();
    params
}

fn read_abc(path: &str, params: &mut ParseParams) -> Result<(Timeline, AbcInfo)> {
    let file = AbcFile::read(Path::new(path))?;
    abc_codec::convert(&[file], params).with_context(|| format!("Failed to parse ABC file: {}", path))
}

/// Parts named and voiced the way the ABC file had them.
fn parts_from_abc(sequence: &SequenceData, info: &AbcInfo) -> Vec<ExportPart> {
    sequence
        .tracks()
        .iter()
        .enumerate()
        .filter(|(_, track)| !track.notes.is_empty())
        .filter_map(|(index, track)| {
            let part = info.track_part(index)?;
            Some(
                ExportPart::new(
                    info.part_name(part),
                    info.part_number(part),
                    info.part_instrument(part),
                )
                .with_track(ExportTrack::new(track.notes.clone())),
            )
        })
        .collect()
}

fn export_abc(
    matches: &ArgMatches,
    sequence: &SequenceData,
    mut parts: Vec<ExportPart>,
    metadata: SongMetadata,
    triplets: bool,
    overrides: &HashMap<u32, Instrument>,
) -> Result<String> {
    for part in &mut parts {
        if let Some(instrument) = overrides.get(&part.part_number) {
            part.instrument = *instrument;
        }
    }

    let params = ExportParams {
        export_tempo_factor: matches.get_one::<f32>("tempo-factor").copied().unwrap_or(1.0),
        triplet_timing: triplets || matches.get_flag("triplets"),
        skip_silence_at_start: matches.get_flag("skip-silence"),
        ..ExportParams::default()
    };
    let meter = matches
        .get_one::<TimeSignature>("meter")
        .copied()
        .or(sequence.time_signature())
        .unwrap_or_default();
    let key = matches
        .get_one::<KeySignature>("key")
        .copied()
        .or(sequence.key_signature())
        .unwrap_or(KeySignature::C_MAJOR);

    let qtm = QuantizedTimingInfo::new(
        sequence,
        params.export_tempo_factor,
        meter,
        params.triplet_timing,
    )?;
    let exporter = AbcExporter::new(&parts, &qtm, key, metadata, params)?;
    Ok(exporter.export()?)
}

fn main() -> Result<()> {
    let matches = command().get_matches();

    let verbose = matches.get_flag("verbose");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if verbose {
        "abc_codec=debug"
    } else {
        "abc_codec=info"
    }))
    .init();

    let input_file = matches
        .get_one::<String>("input")
        .ok_or_else(|| anyhow!("Missing input file"))?;
    let output_file = matches
        .get_one::<String>("output")
        .ok_or_else(|| anyhow!("Missing output file"))?;
    let overrides: HashMap<u32, Instrument> = matches
        .get_many::<(u32, Instrument)>("instrument")
        .unwrap_or_default()
        .copied()
        .collect();

    let input_format = detect_file_format(input_file)
        .with_context(|| format!("Failed to detect input file format: {}", input_file))?;
    let output_format = detect_file_format(output_file)
        .with_context(|| format!("Failed to detect output file format: {}", output_file))?;
    debug!("Input format: {:?}, Output format: {:?}", input_format, output_format);

    match (input_format, output_format) {
        (FileFormat::Abc, FileFormat::Midi) => {
            #[cfg(feature = "midi")]
            {
                let mut params = parse_params(&matches, &overrides);
                let (timeline, info) = read_abc(input_file, &mut params)?;
                info!("Read \"{}\" with {} parts", info.title(), info.part_count());
                let midi_bytes =
                    midi::timeline_to_midi(&timeline).context("Failed to convert ABC to MIDI")?;
                std::fs::write(output_file, midi_bytes)
                    .with_context(|| format!("Failed to write MIDI file: {}", output_file))?;
            }
            #[cfg(not(feature = "midi"))]
            {
                anyhow::bail!("MIDI support is not enabled. Compile with --features midi");
            }
        }
        (FileFormat::Abc, FileFormat::Abc) => {
            // Exported parts are shifted back by each instrument's octave,
            // so read plain General MIDI pitches.
            let mut params = parse_params(&matches, &overrides);
            params.use_native_instruments = false;
            let (timeline, info) = read_abc(input_file, &mut params)?;
            info!("Read \"{}\" with {} parts", info.title(), info.part_count());

            let sequence = SequenceData::from_timeline(&timeline);
            let metadata = SongMetadata {
                title: info.title(),
                composer: info.composer(),
                transcriber: info.transcriber(),
            };
            let parts = parts_from_abc(&sequence, &info);
            let abc = export_abc(
                &matches,
                &sequence,
                parts,
                metadata,
                info.has_triplets(),
                &overrides,
            )?;
            std::fs::write(output_file, abc)
                .with_context(|| format!("Failed to write ABC file: {}", output_file))?;
        }
        (FileFormat::Midi, FileFormat::Abc) => {
            #[cfg(feature = "midi")]
            {
                let midi_bytes = std::fs::read(input_file)
                    .with_context(|| format!("Failed to read MIDI file: {}", input_file))?;
                let timeline =
                    midi::midi_to_timeline(&midi_bytes).context("Failed to read MIDI file")?;
                let sequence = SequenceData::from_timeline(&timeline);

                let title = timeline
                    .track(0)
                    .and_then(|t| t.name())
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_string)
                    .or_else(|| {
                        Path::new(input_file)
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                    })
                    .unwrap_or_default();
                let metadata = SongMetadata {
                    title,
                    ..SongMetadata::default()
                };
                let parts = parts_from_sequence(&sequence);
                info!("Read {} parts from MIDI", parts.len());
                let abc = export_abc(&matches, &sequence, parts, metadata, false, &overrides)?;
                std::fs::write(output_file, abc)
                    .with_context(|| format!("Failed to write ABC file: {}", output_file))?;
            }
            #[cfg(not(feature = "midi"))]
            {
                anyhow::bail!("MIDI support is not enabled. Compile with --features midi");
            }
        }
        (FileFormat::Midi, FileFormat::Midi) => {
            anyhow::bail!("Nothing to convert: both files are MIDI");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_file_format() {
        assert_eq!(detect_file_format("song.ABC").unwrap(), FileFormat::Abc);
        assert_eq!(detect_file_format("song.mid").unwrap(), FileFormat::Midi);
        assert!(detect_file_format("song").is_err());
        assert!(detect_file_format("song.wav").is_err());
    }

    #[test]
    fn test_parts_from_abc_skips_silent_parts() {
        let abc = "X:1\nT:Song - Horn\nK:C\n\nX:2\nT:Song - Flute\nK:C\nC4|\n";
        let mut params = ParseParams::with_seed(1);
        params.use_native_instruments = false;
        let (timeline, info) =
            abc_codec::convert(&[AbcFile::from_text("song.abc", abc)], &mut params).unwrap();

        let parts = parts_from_abc(&SequenceData::from_timeline(&timeline), &info);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].title, "Flute");
        assert_eq!(parts[0].part_number, 2);
        assert_eq!(parts[0].instrument, Instrument::Flute);
    }

    #[test]
    fn test_instrument_override() {
        assert_eq!(
            parse_instrument_override("2=theorbo").unwrap(),
            (2, Instrument::Theorbo)
        );
        assert!(parse_instrument_override("theorbo").is_err());
        assert!(parse_instrument_override("x=theorbo").is_err());
    }

    #[test]
    fn test_command_parses_options() {
        let matches = command()
            .try_get_matches_from([
                "abc-codec",
                "in.abc",
                "out.abc",
                "--meter",
                "3/4",
                "--instrument",
                "1=flute",
                "--instrument",
                "2=horn",
                "--tempo-factor",
                "0.5",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<TimeSignature>("meter").map(|m| m.to_string()),
            Some("3/4".to_string())
        );
        assert_eq!(matches.get_many::<(u32, Instrument)>("instrument").unwrap().count(), 2);
        assert_eq!(matches.get_one::<f32>("tempo-factor"), Some(&0.5));
    }
}
