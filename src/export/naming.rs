use chrono::NaiveDate;

fn token(s: &str) -> String {
    s.trim().to_lowercase().replace(' ', "_")
}

/// `{uid}_{group}_{instrument}_{layer}.wav`
pub fn audio_filename(uid: &str, group: &str, instrument: &str, layer: &str) -> String {
    format!(
        "{uid}_{}_{}_{}.wav",
        token(group),
        token(instrument),
        token(layer)
    )
}

/// `{uid}_midi_{group}_{instrument}.mid`
pub fn midi_filename(uid: &str, group: &str, instrument: &str) -> String {
    format!("{uid}_midi_{}_{}.mid", token(group), token(instrument))
}

pub fn metadata_filename(uid: &str) -> String {
    format!("{uid}_info.json")
}

pub fn batch_dir_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}", date.format("%Y-%m-%d"))
}

/// `{uid}_{genre}_{bpm}_{key}`; BPM is truncated to an integer.
pub fn track_dir_name(uid: &str, genre: &str, bpm: f64, key: &str) -> String {
    format!("{uid}_{genre}_{}_{key}", bpm.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_are_lowercase() {
        assert_eq!(
            audio_filename("GP_00001", "Drums", "Hat Closed", "Main"),
            "GP_00001_drums_hat_closed_main.wav"
        );
        assert_eq!(
            midi_filename("GP_00001", "Bass", "Sub"),
            "GP_00001_midi_bass_sub.mid"
        );
        assert_eq!(metadata_filename("GP_00001"), "GP_00001_info.json");
    }

    #[test]
    fn directory_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(batch_dir_name("Batch", date), "Batch_2024-03-09");
        assert_eq!(
            track_dir_name("GP_00001", "TechHouse", 126.7, "Fmin"),
            "GP_00001_TechHouse_126_Fmin"
        );
    }
}
