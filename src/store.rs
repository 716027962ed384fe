use crate::error::LookupError;
use crate::model::EnvMap;
use crate::parser::{Binding, QuoteKind, ValuePart};
use crate::variables::{EnvView, Layered, parse_variables, resolve};

impl EnvView for EnvMap {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_owned)
    }
}

/// Folds bindings into an [`EnvMap`], optionally expanding `${...}`
/// references as it goes.
///
/// Values resolved earlier are visible to later bindings. With
/// `override_ambient` those file-local values shadow the ambient
/// environment; without it the ambient environment is consulted first.
#[derive(Debug, Clone)]
pub struct StoreBuilder<E> {
    values: EnvMap,
    ambient: E,
    interpolate: bool,
    override_ambient: bool,
}

impl<E: EnvView> StoreBuilder<E> {
    pub fn new(ambient: E, interpolate: bool, override_ambient: bool) -> Self {
        Self {
            values: EnvMap::new(),
            ambient,
            interpolate,
            override_ambient,
        }
    }

    pub fn push(&mut self, binding: &Binding) -> Result<(), LookupError> {
        let (Some(key), Some(flat)) = (&binding.key, &binding.value) else {
            return Ok(());
        };

        let value = if self.interpolate {
            self.resolve_parts(&binding.parts)?
        } else {
            flat.clone()
        };
        self.values.insert(key.clone(), value);
        Ok(())
    }

    pub fn extend<I>(&mut self, bindings: I) -> Result<(), LookupError>
    where
        I: IntoIterator<Item = Binding>,
    {
        for binding in bindings {
            self.push(&binding)?;
        }
        Ok(())
    }

    pub fn finish(self) -> EnvMap {
        self.values
    }

    fn resolve_parts(&self, parts: &[ValuePart]) -> Result<String, LookupError> {
        let mut out = String::new();
        for part in parts {
            if part.quote == Some(QuoteKind::Single) {
                out.push_str(&part.text);
                continue;
            }
            let atoms = parse_variables(&part.text);
            let resolved = if self.override_ambient {
                resolve(
                    &atoms,
                    &Layered {
                        first: &self.values,
                        second: &self.ambient,
                    },
                )?
            } else {
                resolve(
                    &atoms,
                    &Layered {
                        first: &self.ambient,
                        second: &self.values,
                    },
                )?
            };
            out.push_str(&resolved);
        }
        Ok(out)
    }
}

/// Fold `bindings` into an ordered map in one go.
pub fn build<I, E>(
    bindings: I,
    ambient: E,
    interpolate: bool,
    override_ambient: bool,
) -> Result<EnvMap, LookupError>
where
    I: IntoIterator<Item = Binding>,
    E: EnvView,
{
    let mut builder = StoreBuilder::new(ambient, interpolate, override_ambient);
    builder.extend(bindings)?;
    Ok(builder.finish())
}
