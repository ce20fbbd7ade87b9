use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{collections::BTreeSet, fs, path::Path, path::PathBuf};
use tracing::{info, warn};

use crate::classify::{Thresholds, DEFAULT_UVT};
use crate::table::{utils::normalize_header, Encoding};

/// Where a table comes from and how to read it.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSource {
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub delimiter: char,
    pub encoding: Encoding,
}

impl TableSource {
    fn new(delimiter: char, encoding: Encoding) -> Self {
        Self {
            path: None,
            delimiter,
            encoding,
        }
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.delimiter)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub registry: TableSource,
    pub sectors: TableSource,
    pub municipalities: TableSource,
    pub output_dir: Option<PathBuf>,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            registry: TableSource::new('|', Encoding::Latin1),
            sectors: TableSource::new(';', Encoding::Utf8),
            municipalities: TableSource::new(';', Encoding::Utf8),
            output_dir: None,
        }
    }
}

/// Column names, compared after trimming and upper-casing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub activity_code: String,
    pub revenue: String,
    pub municipality: String,
    pub sector_code: String,
    pub branch: String,
    pub municipality_code: String,
    pub department: String,
    pub tier: String,
    /// Leading output columns, in order.
    pub required: Vec<String>,
}

pub const DEFAULT_REQUIRED_COLUMNS: [&str; 29] = [
    "MATRICULA",
    "RAZON_SOCIAL",
    "CODIGO_CLASE_IDENTIFICACION",
    "NUMERO_IDENTIFICACION",
    "FECHA_RENOVACION",
    "ULTIMO_ANO_RENOVADO",
    "FECHA_MATRICULA",
    "FECHA_CANCELACION",
    "CODIGO_ORGANIZACION_JURIDICA",
    "DESC_ORGANIZACION_JURIDICA",
    "CODIGO_TIPO_SOCIEDAD",
    "DESC_TIPO_SOCIEDAD",
    "CODIGO_CATEGORIA_MATRICULA",
    "DESC_CATEGORIA_MATRICULA",
    "CODIGO_ESTADO_MATRICULA",
    "MUNICIPIO_COMERCIAL",
    "DPTO_COMERCIAL",
    "COD_CIIU_ACT_ECON_PRI",
    "ACTIVOS_TOTAL",
    "COD_CIIU_ACT_ECON_SEC",
    "CIIU3",
    "CIIU4",
    "FECHA_INICIO_ACT_ECON_PRI",
    "CIIU_MAYORES_INGRESOS",
    "INGRESOS_ACTIVIDAD_ORDINARIA",
    "UTILIDAD_PERDIDA_OPERACIONAL",
    "RESULTADO_DEL_PERIODO",
    "EMPLEADOS",
    "TAMANO_EMPRESA",
];

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            activity_code: "COD_CIIU_ACT_ECON_PRI".into(),
            revenue: "INGRESOS_ACTIVIDAD_ORDINARIA".into(),
            municipality: "MUNICIPIO_COMERCIAL".into(),
            sector_code: "CIIU_INT".into(),
            branch: "RAMA".into(),
            municipality_code: "MPIO_CDPMP".into(),
            department: "DPTO_COMERCIAL".into(),
            tier: "TAMANO_EMPRESA".into(),
            required: DEFAULT_REQUIRED_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ColumnsConfig {
    fn normalize(&mut self) {
        for name in [
            &mut self.activity_code,
            &mut self.revenue,
            &mut self.municipality,
            &mut self.sector_code,
            &mut self.branch,
            &mut self.municipality_code,
            &mut self.department,
            &mut self.tier,
        ] {
            *name = normalize_header(name);
        }
        for name in &mut self.required {
            *name = normalize_header(name);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Exact department names to keep.
    pub allowed: BTreeSet<String>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            allowed: ["BOGOTA", "CUNDINAMARCA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub uvt: u64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self { uvt: DEFAULT_UVT }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub csv_name: String,
    pub xlsx_name: String,
    pub parquet_name: String,
    /// Also write a Parquet copy of the output.
    pub parquet: bool,
    pub delimiter: char,
    pub encoding: Encoding,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            csv_name: "02_empresas_filtradas_BOG_CUND.csv".into(),
            xlsx_name: "03_empresas_filtradas_BOG_CUND.xlsx".into(),
            parquet_name: "04_empresas_filtradas_BOG_CUND.parquet".into(),
            parquet: false,
            delimiter: ';',
            encoding: Encoding::Utf8Bom,
        }
    }
}

impl ExportConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.delimiter)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inputs: InputsConfig,
    pub columns: ColumnsConfig,
    pub region: RegionConfig,
    pub classification: ClassificationConfig,
    pub export: ExportConfig,
}

impl Config {
    /// Load from a YAML file, or use the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                let cfg: Config = serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing config {}", p.display()))?;
                info!(path = %p.display(), "loaded config");
                cfg
            }
            None => Config::default(),
        };
        config.columns.normalize();
        Ok(config)
    }

    /// Check everything that would otherwise fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        for source in [
            &self.inputs.registry,
            &self.inputs.sectors,
            &self.inputs.municipalities,
        ] {
            source.delimiter_byte()?;
        }
        self.export.delimiter_byte()?;
        Thresholds::new(self.classification.uvt)?;
        if self.region.allowed.is_empty() {
            warn!("region.allowed is empty, every row will be filtered out");
        }
        for name in [
            &self.export.csv_name,
            &self.export.xlsx_name,
            &self.export.parquet_name,
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                bail!("export file name {:?} must be a plain file name", name);
            }
        }
        Ok(())
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    if c.is_ascii() && c != '"' && c != '\n' && c != '\r' {
        Ok(c as u8)
    } else {
        bail!("delimiter {:?} must be a single ASCII character other than a quote or newline", c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_describe_the_bogota_deployment() -> Result<()> {
        let cfg = Config::load(None)?;
        cfg.validate()?;
        assert_eq!(cfg.inputs.registry.delimiter_byte()?, b'|');
        assert_eq!(cfg.inputs.registry.encoding, Encoding::Latin1);
        assert_eq!(cfg.inputs.sectors.encoding, Encoding::Utf8);
        assert_eq!(cfg.export.encoding, Encoding::Utf8Bom);
        assert_eq!(cfg.classification.uvt, 47_065);
        assert!(cfg.region.allowed.contains("BOGOTA"));
        assert!(cfg.region.allowed.contains("CUNDINAMARCA"));
        assert_eq!(cfg.columns.required.first().map(String::as_str), Some("MATRICULA"));
        assert_eq!(cfg.columns.required.last().map(String::as_str), Some("TAMANO_EMPRESA"));
        Ok(())
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(
            tmp,
            r#"
inputs:
  registry:
    path: /data/rues.txt
    delimiter: "|"
    encoding: latin1
classification:
  uvt: 49799
region:
  allowed: [ANTIOQUIA]
columns:
  branch: " rama "
export:
  parquet: true
"#
        )?;
        let cfg = Config::load(Some(tmp.path()))?;
        cfg.validate()?;
        assert_eq!(cfg.inputs.registry.path, Some(PathBuf::from("/data/rues.txt")));
        assert_eq!(cfg.inputs.sectors.delimiter, ';');
        assert_eq!(cfg.classification.uvt, 49_799);
        assert_eq!(cfg.region.allowed.len(), 1);
        assert_eq!(cfg.columns.branch, "RAMA");
        assert_eq!(cfg.columns.revenue, "INGRESOS_ACTIVIDAD_ORDINARIA");
        assert!(cfg.export.parquet);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.classification.uvt = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.export.delimiter = 'ñ';
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.export.csv_name = "../escape.csv".into();
        assert!(cfg.validate().is_err());
    }
}
