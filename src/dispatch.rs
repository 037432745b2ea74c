use crate::error::{Result, SimError};
use crate::field::FieldDescription;
use crate::fixed::{FastFixed, Fixed};
use crate::scalar::Scalar;
use crate::sim::Simulator;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// Numeric role selection as given on the command line. Only the tags listed
// in `select_scalar` are recognized; anything else is InvalidTypeTag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Float,
    Double,
    Fixed(usize, usize),
    FastFixed(usize, usize),
}

impl FromStr for TypeTag {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FLOAT" => return Ok(Self::Float),
            "DOUBLE" => return Ok(Self::Double),
            _ => {}
        }
        let malformed = || SimError::InvalidTypeTag(s.to_string());
        let (base, args) = s.split_once('(').ok_or_else(malformed)?;
        let args = args.strip_suffix(')').ok_or_else(malformed)?;
        let (n, k) = args.split_once(',').ok_or_else(malformed)?;
        let n = n.trim().parse::<usize>().map_err(|_| malformed())?;
        let k = k.trim().parse::<usize>().map_err(|_| malformed())?;
        match base {
            "FIXED" => Ok(Self::Fixed(n, k)),
            "FAST_FIXED" => Ok(Self::FastFixed(n, k)),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float => write!(f, "FLOAT"),
            Self::Double => write!(f, "DOUBLE"),
            Self::Fixed(n, k) => write!(f, "FIXED({n},{k})"),
            Self::FastFixed(n, k) => write!(f, "FAST_FIXED({n},{k})"),
        }
    }
}

// The type-erased surface the driver works against once the numeric roles
// are resolved.
pub trait Simulation: fmt::Debug {
    fn run(
        &mut self,
        steps: usize,
        checkpoint_interval: usize,
        checkpoint_path: Option<&Path>,
    ) -> Result<()>;
    fn save_state(&self, path: &Path) -> Result<()>;
    fn load_state(&mut self, path: &Path) -> Result<()>;
    fn checkpoint_string(&self) -> String;
}

impl<P: Scalar, V: Scalar, VF: Scalar> Simulation for Simulator<P, V, VF> {
    fn run(
        &mut self,
        steps: usize,
        checkpoint_interval: usize,
        checkpoint_path: Option<&Path>,
    ) -> Result<()> {
        Simulator::run(self, steps, checkpoint_interval, checkpoint_path)
    }

    fn save_state(&self, path: &Path) -> Result<()> {
        Simulator::save_state(self, path)
    }

    fn load_state(&mut self, path: &Path) -> Result<()> {
        Simulator::load_state(self, path)
    }

    fn checkpoint_string(&self) -> String {
        Simulator::checkpoint_string(self)
    }
}

macro_rules! select_scalar {
    ($tag:expr, |$t:ident| $body:expr) => {
        match $tag {
            TypeTag::Float => {
                type $t = f32;
                $body
            }
            TypeTag::Double => {
                type $t = f64;
                $body
            }
            TypeTag::Fixed(32, 16) => {
                type $t = Fixed<32, 16>;
                $body
            }
            TypeTag::Fixed(64, 32) => {
                type $t = Fixed<64, 32>;
                $body
            }
            TypeTag::FastFixed(16, 8) => {
                type $t = FastFixed<16, 8>;
                $body
            }
            TypeTag::FastFixed(32, 16) => {
                type $t = FastFixed<32, 16>;
                $body
            }
            other => return Err(SimError::InvalidTypeTag(other.to_string())),
        }
    };
}

// Resolves the three role tags into a fully monomorphized engine behind a
// trait object. One monomorphization exists per recognized type triple.
pub fn build_simulation(
    desc: &FieldDescription,
    p_tag: TypeTag,
    v_tag: TypeTag,
    vf_tag: TypeTag,
    seed: u64,
) -> Result<Box<dyn Simulation>> {
    select_scalar!(p_tag, |P0| with_velocity::<P0>(desc, v_tag, vf_tag, seed))
}

fn with_velocity<P: Scalar>(
    desc: &FieldDescription,
    v_tag: TypeTag,
    vf_tag: TypeTag,
    seed: u64,
) -> Result<Box<dyn Simulation>> {
    select_scalar!(v_tag, |V0| with_flow::<P, V0>(desc, vf_tag, seed))
}

fn with_flow<P: Scalar, V: Scalar>(
    desc: &FieldDescription,
    vf_tag: TypeTag,
    seed: u64,
) -> Result<Box<dyn Simulation>> {
    select_scalar!(vf_tag, |VF0| Ok(Box::new(Simulator::<P, V, VF0>::new(
        desc, seed
    )?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::DEFAULT_SEED;

    #[test]
    fn parses_all_recognized_tags() {
        assert_eq!("FLOAT".parse::<TypeTag>().unwrap(), TypeTag::Float);
        assert_eq!("DOUBLE".parse::<TypeTag>().unwrap(), TypeTag::Double);
        assert_eq!(
            "FIXED(32,16)".parse::<TypeTag>().unwrap(),
            TypeTag::Fixed(32, 16)
        );
        assert_eq!(
            "FAST_FIXED(16, 8)".parse::<TypeTag>().unwrap(),
            TypeTag::FastFixed(16, 8)
        );
    }

    #[test]
    fn rejects_malformed_tags() {
        for bad in ["float", "FIXED(32", "FIXED(a,b)", "FIXED 32 16", "SLOW_FIXED(16,8)"] {
            assert!(
                matches!(bad.parse::<TypeTag>(), Err(SimError::InvalidTypeTag(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for tag in [
            TypeTag::Float,
            TypeTag::Double,
            TypeTag::Fixed(64, 32),
            TypeTag::FastFixed(32, 16),
        ] {
            assert_eq!(tag.to_string().parse::<TypeTag>().unwrap(), tag);
        }
    }

    fn small_desc() -> FieldDescription {
        FieldDescription::parse("3 3\n0.2\n###\n#.#\n###\n").unwrap()
    }

    #[test]
    fn builds_engines_for_mixed_role_types() {
        let desc = small_desc();
        let mut sim = build_simulation(
            &desc,
            TypeTag::Fixed(32, 16),
            TypeTag::Float,
            TypeTag::Double,
            DEFAULT_SEED,
        )
        .unwrap();
        sim.run(2, 0, None).unwrap();
        assert!(sim.checkpoint_string().starts_with("3 3\n"));
    }

    #[test]
    fn unrecognized_size_pair_is_an_invalid_tag() {
        let desc = small_desc();
        let err = build_simulation(
            &desc,
            TypeTag::Fixed(8, 4),
            TypeTag::Float,
            TypeTag::Float,
            DEFAULT_SEED,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidTypeTag(_)));
    }
}
