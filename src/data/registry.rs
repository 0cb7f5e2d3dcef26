//! Survey instruments, their per-cycle source files and retained columns

use crate::data::Split;

/// Public survey file host
pub const DEFAULT_BASE_URL: &str = "https://wwwn.cdc.gov/Nchs/Data/Nhanes/Public";

/// Canonical sleep-duration column produced by coalescing
pub const SLEEP_HOURS_COLUMN: &str = "SLD_HOURS";

/// Legacy sleep-duration names, in coalescing priority
pub const LEGACY_SLEEP_COLUMNS: [&str; 2] = ["SLD010H", "SLD012"];

/// Training cycles and their file suffix letter
const TRAIN_CYCLES: [(u16, char); 5] = [
    (2007, 'E'),
    (2009, 'F'),
    (2011, 'G'),
    (2013, 'H'),
    (2015, 'I'),
];

/// Pre-pandemic holdout cycle
const TEST_CYCLE: u16 = 2017;

const BLOOD_PRESSURE_COLUMNS: &[&str] = &[
    "SEQN", "BPXSY1", "BPXDI1", "BPXSY2", "BPXDI2", "BPXSY3", "BPXDI3", "BPXSY4", "BPXDI4",
];

const PHYSICAL_ACTIVITY_COLUMNS: &[&str] = &[
    "SEQN", "PAQ605", "PAQ610", "PAD615", "PAQ635", "PAQ640", "PAD645", "PAQ650", "PAQ655",
    "PAD660", "PAQ665", "PAQ670",
];

const SLEEP_COLUMNS: &[&str] = &["SEQN", "SLD010H", "SLD012", "SLQ050"];

const DIET_COLUMNS: &[&str] = &[
    "SEQN", "DBQ010", "DBD030", "DBD050", "DBQ700", "DBQ197", "DBQ229", "DBQ235A", "DBQ235B",
    "DBQ235C", "DBQ301", "DBQ330", "DBQ360", "DBQ370", "DBD381", "DBQ390", "DBQ400", "DBD411",
    "DBQ421", "DBQ424", "DBD895", "DBD900", "DBD905", "DBD910",
];

const BODY_MEASURES_COLUMNS: &[&str] = &[
    "SEQN", "BMDSTATS", "BMXWT", "BMIWT", "BMXRECUM", "BMIRECUM", "BMXHEAD", "BMIHEAD", "BMXHT",
    "BMIHT", "BMXBMI", "BMXLEG", "BMILEG", "BMXARML", "BMIARML", "BMXARMC", "BMIARMC",
    "BMXWAIST", "BMIWAIST",
];

const DEMOGRAPHICS_COLUMNS: &[&str] = &[
    "SEQN", "SDDSRVYR", "RIDSTATR", "RIAGENDR", "RIDAGEYR", "RIDAGEMN", "RIDRETH1", "DMDEDUC2",
    "RIDEXPRG", "SIALANG", "SIAPROXY", "SIAINTRP", "FIALANG", "FIAPROXY", "FIAINTRP", "MIALANG",
    "MIAPROXY", "MIAINTRP", "SDMVPSU", "SDMVSTRA", "INDFMPIR",
];

const BP_HISTORY_COLUMNS: &[&str] = &[
    "SEQN", "BPQ020", "BPQ030", "BPD035", "BPQ040A", "BPQ050A", "BPQ060", "BPQ070", "BPQ080",
    "BPQ090D", "BPQ100D",
];

const SMOKING_COLUMNS: &[&str] = &[
    "SEQN", "SMQ020", "SMD030", "SMQ040", "SMQ050Q", "SMQ050U", "SMD057", "SMD641", "SMD650",
    "SMD093", "SMDUPCA", "SMD100BR", "SMD100FL", "SMD100MN", "SMD100LN", "SMD100TR", "SMD100NI",
    "SMD100CO", "SMD630", "SMQ670", "SMAQUEX2",
];

/// Survey instrument (one questionnaire or examination module)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    BloodPressure,
    Demographics,
    BodyMeasures,
    PhysicalActivity,
    Sleep,
    Diet,
    BloodPressureHistory,
    Smoking,
}

/// One remote file contributing to an instrument table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Survey cycle start year, written to the `year` column
    pub year: u16,
    /// Download location
    pub url: String,
}

impl Instrument {
    /// All instruments in download order
    pub const ALL: [Instrument; 8] = [
        Instrument::BloodPressure,
        Instrument::Demographics,
        Instrument::BodyMeasures,
        Instrument::PhysicalActivity,
        Instrument::Sleep,
        Instrument::Diet,
        Instrument::BloodPressureHistory,
        Instrument::Smoking,
    ];

    /// Survey short code
    pub fn code(&self) -> &'static str {
        match self {
            Instrument::BloodPressure => "BPX",
            Instrument::Demographics => "DEMO",
            Instrument::BodyMeasures => "BMX",
            Instrument::PhysicalActivity => "PAQ",
            Instrument::Sleep => "SLQ",
            Instrument::Diet => "DBQ",
            Instrument::BloodPressureHistory => "BPQ",
            Instrument::Smoking => "SMQ",
        }
    }

    /// Descriptive name used for raw output files
    pub fn output_name(&self) -> &'static str {
        match self {
            Instrument::BloodPressure => "BloodPressure",
            Instrument::Demographics => "AgeAndSex",
            Instrument::BodyMeasures => "BodyMeasures",
            Instrument::PhysicalActivity => "PhysicalActivity",
            Instrument::Sleep => "SleepDisorder",
            Instrument::Diet => "Dietary",
            Instrument::BloodPressureHistory => "Hypertension",
            Instrument::Smoking => "TabacoUse",
        }
    }

    /// Raw file name for one split, e.g. `AgeAndSex_TRAIN.csv`
    pub fn output_file(&self, split: Split) -> String {
        format!("{}_{}.csv", self.output_name(), split.raw_suffix())
    }

    /// Columns listed for this instrument in the survey documentation
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Instrument::BloodPressure => BLOOD_PRESSURE_COLUMNS,
            Instrument::Demographics => DEMOGRAPHICS_COLUMNS,
            Instrument::BodyMeasures => BODY_MEASURES_COLUMNS,
            Instrument::PhysicalActivity => PHYSICAL_ACTIVITY_COLUMNS,
            Instrument::Sleep => SLEEP_COLUMNS,
            Instrument::Diet => DIET_COLUMNS,
            Instrument::BloodPressureHistory => BP_HISTORY_COLUMNS,
            Instrument::Smoking => SMOKING_COLUMNS,
        }
    }

    /// Columns kept in the accumulated table
    ///
    /// The sleep instrument swaps its two legacy duration names for the
    /// coalesced column.
    pub fn retained_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self
            .columns()
            .iter()
            .copied()
            .filter(|c| *self != Instrument::Sleep || !LEGACY_SLEEP_COLUMNS.contains(c))
            .collect();
        if *self == Instrument::Sleep {
            columns.push(SLEEP_HOURS_COLUMN);
        }
        columns
    }

    /// Remote file stem for a cycle, e.g. `DEMO_E` or `P_BPXO`
    fn file_stem(&self, split: Split, suffix: char) -> String {
        match split {
            Split::Train => format!("{}_{}", self.code(), suffix),
            Split::Test => match self {
                Instrument::BloodPressure => "P_BPXO".to_string(),
                _ => format!("P_{}", self.code()),
            },
        }
    }

    /// Source files for one split, in cycle order
    pub fn sources(&self, split: Split, base_url: &str) -> Vec<SourceFile> {
        let base = base_url.trim_end_matches('/');
        let cycles: Vec<(u16, char)> = match split {
            Split::Train => TRAIN_CYCLES.to_vec(),
            Split::Test => vec![(TEST_CYCLE, 'P')],
        };
        cycles
            .into_iter()
            .map(|(year, suffix)| SourceFile {
                year,
                url: format!(
                    "{}/{}/DataFiles/{}.xpt",
                    base,
                    year,
                    self.file_stem(split, suffix)
                ),
            })
            .collect()
    }

    /// Parse a short code or descriptive name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| {
            i.code().eq_ignore_ascii_case(name) || i.output_name().eq_ignore_ascii_case(name)
        })
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_sources() {
        let sources = Instrument::BloodPressure.sources(Split::Train, DEFAULT_BASE_URL);
        assert_eq!(sources.len(), 5);
        assert_eq!(sources[0].year, 2007);
        assert_eq!(
            sources[0].url,
            "https://wwwn.cdc.gov/Nchs/Data/Nhanes/Public/2007/DataFiles/BPX_E.xpt"
        );
        assert!(sources[4].url.ends_with("2015/DataFiles/BPX_I.xpt"));
    }

    #[test]
    fn test_test_sources_use_prepandemic_files() {
        let bp = Instrument::BloodPressure.sources(Split::Test, DEFAULT_BASE_URL);
        assert_eq!(bp.len(), 1);
        assert!(bp[0].url.ends_with("2017/DataFiles/P_BPXO.xpt"));

        let demo = Instrument::Demographics.sources(Split::Test, "http://mirror/");
        assert_eq!(demo[0].url, "http://mirror/2017/DataFiles/P_DEMO.xpt");
    }

    #[test]
    fn test_sleep_retained_columns() {
        let cols = Instrument::Sleep.retained_columns();
        assert_eq!(cols, vec!["SEQN", "SLQ050", SLEEP_HOURS_COLUMN]);
        assert_eq!(
            Instrument::Smoking.retained_columns().len(),
            Instrument::Smoking.columns().len()
        );
    }

    #[test]
    fn test_output_files() {
        assert_eq!(Instrument::Demographics.output_file(Split::Train), "AgeAndSex_TRAIN.csv");
        assert_eq!(Instrument::Smoking.output_file(Split::Test), "TabacoUse_TEST.csv");
        assert_eq!(Instrument::from_name("slq"), Some(Instrument::Sleep));
        assert_eq!(Instrument::from_name("BodyMeasures"), Some(Instrument::BodyMeasures));
    }
}
