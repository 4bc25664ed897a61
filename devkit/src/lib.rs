/*!
# Laser DevKit - Mocks et utilitaires de test pour la console

Bibliothèque facilitant les tests du moteur de synchronisation avec:
- Mock du device-server (découverte + commandes enregistrées)
- Mock du stream WebSocket (injection de messages depuis le test)
- Builders d'enveloppes `signals` / `flags` et de fiches de découverte
- Harness de session complet
*/

pub mod mock_api;
pub mod mock_stream;
pub mod builders;
pub mod test_utils;

pub use mock_api::MockDeviceApi;
pub use mock_stream::MockStreamConnector;
pub use builders::{DeviceRecordBuilder, EnvelopeBuilder};
pub use test_utils::TestHarness;
